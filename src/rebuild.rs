//! Rebuild pipeline
//!
//! Loads labels, streams blocks through the merger into a
//! [`GeoIndexBuilder`], serializes the result and swaps it into place on
//! disk. Row problems are collected and reported; only source, build or
//! persist failures abort, and those leave the existing file untouched.

use crate::blocks::{BlockOutcome, BlockSource, RowError};
use crate::config::GeoConfig;
use crate::database::GeoDatabase;
use crate::error::{GeoError, Result};
use crate::file_reader::TableSource;
use crate::index_builder::GeoIndexBuilder;
use crate::labels::LabelStore;
use crate::merge::merge;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Where a rebuild currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStage {
    /// Not started
    Idle,
    /// Reading the locations table
    LoadingLabels,
    /// Reading the blocks table
    StreamingBlocks,
    /// Joining blocks with labels and inserting them
    Merging,
    /// Laying out the tree and metadata
    IndexBuilding,
    /// Writing the file into place
    Serializing,
    /// Finished without row errors
    Success,
    /// Finished with row errors
    PartialSuccess,
    /// Aborted; the previous file is untouched
    Failed,
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebuildStage::Idle => "idle",
            RebuildStage::LoadingLabels => "loading labels",
            RebuildStage::StreamingBlocks => "streaming blocks",
            RebuildStage::Merging => "merging",
            RebuildStage::IndexBuilding => "building index",
            RebuildStage::Serializing => "serializing",
            RebuildStage::Success => "success",
            RebuildStage::PartialSuccess => "partial success",
            RebuildStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final status reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildStatus {
    /// Every row was stored
    Success,
    /// The index was replaced but some rows failed
    PartialSuccess,
    /// Nothing was replaced
    Error,
    /// Another rebuild was running
    Busy,
}

/// Summary of one rebuild
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Outcome
    pub status: RebuildStatus,
    /// Human-readable summary
    pub message: String,
    /// `"{network}: {message}"` for each failed row
    pub errors: Vec<String>,
    /// Networks stored in the new index
    pub count: u64,
    /// Rows left out because they had no country
    pub skipped: u64,
}

impl RebuildReport {
    /// Report for a rejected concurrent request
    pub fn busy() -> Self {
        Self {
            status: RebuildStatus::Busy,
            message: GeoError::Busy.to_string(),
            errors: Vec::new(),
            count: 0,
            skipped: 0,
        }
    }

    /// True for success and partial success
    pub fn is_ok(&self) -> bool {
        matches!(
            self.status,
            RebuildStatus::Success | RebuildStatus::PartialSuccess
        )
    }
}

/// Everything a completed rebuild produced
pub struct RebuildOutput {
    /// Summary for the caller
    pub report: RebuildReport,
    /// Freshly loaded labels, present when the index was replaced
    pub labels: Option<LabelStore>,
    /// The new index, already at its final path
    pub database: Option<GeoDatabase>,
}

/// Drives one rebuild from the configured sources
pub struct Rebuilder {
    labels: TableSource,
    blocks: BlockSource,
    output: PathBuf,
    database_type: String,
    stage: RebuildStage,
}

impl Rebuilder {
    /// Rebuilder for the paths in `config`
    pub fn new(config: &GeoConfig) -> Self {
        Self::from_sources(
            config.labels_source(),
            BlockSource::new(config.blocks_source()),
            &config.database,
        )
        .with_database_type(config.database_type.clone())
    }

    /// Rebuilder over explicit sources
    pub fn from_sources(labels: TableSource, blocks: BlockSource, output: impl AsRef<Path>) -> Self {
        Self {
            labels,
            blocks,
            output: output.as_ref().to_path_buf(),
            database_type: crate::index_builder::DEFAULT_DATABASE_TYPE.to_string(),
            stage: RebuildStage::Idle,
        }
    }

    /// Set the `database_type` metadata value
    pub fn with_database_type(mut self, database_type: String) -> Self {
        self.database_type = database_type;
        self
    }

    fn advance(&mut self, stage: RebuildStage) {
        if self.stage != stage {
            debug!("Rebuild stage: {} -> {}", self.stage, stage);
            self.stage = stage;
        }
    }

    /// Run the pipeline
    pub fn run(mut self) -> RebuildOutput {
        let mut rows = RowLog::default();
        match self.build(&mut rows) {
            Ok((labels, database)) => {
                let (status, stage, message) = if rows.errors.is_empty() {
                    (
                        RebuildStatus::Success,
                        RebuildStage::Success,
                        format!("MMDB file rebuilt with {} records.", rows.count),
                    )
                } else {
                    (
                        RebuildStatus::PartialSuccess,
                        RebuildStage::PartialSuccess,
                        format!(
                            "MMDB file rebuilt with {} records, but some errors occurred.",
                            rows.count
                        ),
                    )
                };
                self.advance(stage);
                info!(
                    "{} ({} skipped, {} errors)",
                    message,
                    rows.skipped,
                    rows.errors.len()
                );
                RebuildOutput {
                    report: RebuildReport {
                        status,
                        message,
                        errors: rows.errors,
                        count: rows.count,
                        skipped: rows.skipped,
                    },
                    labels: Some(labels),
                    database: Some(database),
                }
            }
            Err(e) => {
                let failed_at = self.stage;
                self.advance(RebuildStage::Failed);
                error!("Error rebuilding MMDB while {}: {}", failed_at, e);
                RebuildOutput {
                    report: RebuildReport {
                        status: RebuildStatus::Error,
                        message: e.to_string(),
                        errors: rows.errors,
                        count: 0,
                        skipped: rows.skipped,
                    },
                    labels: None,
                    database: None,
                }
            }
        }
    }

    fn build(&mut self, rows: &mut RowLog) -> Result<(LabelStore, GeoDatabase)> {
        self.advance(RebuildStage::LoadingLabels);
        let labels = LabelStore::load(&self.labels)?;

        self.advance(RebuildStage::StreamingBlocks);
        let mut builder = GeoIndexBuilder::new().with_database_type(self.database_type.clone());
        for outcome in self.blocks.rows()? {
            match outcome? {
                BlockOutcome::Block(block) => {
                    self.advance(RebuildStage::Merging);
                    let record = merge(&block, &labels);
                    match builder.insert(&block.network, &record) {
                        Ok(()) => rows.count += 1,
                        Err(error) => rows.fail(RowError {
                            network: block.network.to_string(),
                            error,
                        }),
                    }
                }
                BlockOutcome::Skipped { network, reason } => {
                    debug!("Skipping {}: {}", network, reason);
                    rows.skipped += 1;
                }
                BlockOutcome::Invalid(row_error) => rows.fail(row_error),
            }
        }
        if rows.skipped > 0 {
            warn!("Skipped {} block rows without a registered country", rows.skipped);
        }

        self.advance(RebuildStage::IndexBuilding);
        let bytes = builder.serialize()?;

        self.advance(RebuildStage::Serializing);
        let database = persist(&bytes, &self.output)?;
        Ok((labels, database))
    }
}

#[derive(Default)]
struct RowLog {
    count: u64,
    skipped: u64,
    errors: Vec<String>,
}

impl RowLog {
    fn fail(&mut self, row_error: RowError) {
        let message = row_error.to_string();
        error!("{}", message);
        self.errors.push(message);
    }
}

/// Write `bytes` to `path` atomically and open the result
///
/// The bytes go to a temporary file beside `path`, which is synced, made
/// read-only and opened before it is renamed over the target.
pub fn persist(bytes: &[u8], path: &Path) -> Result<GeoDatabase> {
    let persist_error = |message: String| GeoError::Persist {
        path: path.display().to_string(),
        message,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| persist_error(e.to_string()))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| persist_error(e.to_string()))?;
    temp.write_all(bytes)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| persist_error(e.to_string()))?;
    set_readonly(temp.path()).map_err(|e| persist_error(e.to_string()))?;

    // The mapping stays valid across the rename
    let database = GeoDatabase::open(temp.path())?;
    temp.persist(path)
        .map_err(|e| persist_error(e.error.to_string()))?;
    debug!("Persisted {} bytes to {}", bytes.len(), path.display());
    Ok(database)
}

/// Set file permissions to read-only (0444 on Unix)
fn set_readonly(path: &Path) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();

    #[cfg(unix)]
    {
        perms.set_mode(0o444);
    }

    #[cfg(not(unix))]
    {
        perms.set_readonly(true);
    }

    fs::set_permissions(path, perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LABELS: &str = "\
geoname_id,locale_code,continent_code,continent_name,country_iso_code,country_name,city_name
2077456,en,OC,Oceania,AU,Australia,
2077456,ar,OC,أوقيانوسيا,AU,أستراليا,
";

    const BLOCKS_HEADER: &str =
        "network,geoname_id,registered_country_geoname_id,latitude,longitude,postal_code\n";

    fn rebuilder(blocks: &str, output: &Path) -> Rebuilder {
        Rebuilder::from_sources(
            TableSource::memory(LABELS.as_bytes()),
            BlockSource::new(TableSource::memory(
                format!("{BLOCKS_HEADER}{blocks}").into_bytes(),
            )),
            output,
        )
    }

    #[test]
    fn test_successful_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("city.mmdb");
        let result = rebuilder("1.0.0.0/24,,2077456,-33.494,143.2104,\n", &output).run();

        assert_eq!(result.report.status, RebuildStatus::Success);
        assert_eq!(result.report.count, 1);
        assert_eq!(result.report.message, "MMDB file rebuilt with 1 records.");
        assert!(output.exists());

        let db = result.database.unwrap();
        let record = db.lookup(Ipv4Addr::new(1, 0, 0, 1)).unwrap().unwrap();
        assert_eq!(record.country.ar, "أستراليا");
        assert_eq!(result.labels.unwrap().len(crate::labels::Locale::En), 1);

        let reopened = GeoDatabase::open(&output).unwrap();
        assert_eq!(reopened.record_count(), Some(1));
    }

    #[test]
    fn test_row_errors_give_partial_success() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("city.mmdb");
        let result = rebuilder(
            "1.0.0.0/24,,2077456,,,\n\
             1.0.1.0/33,,2077456,,,\n\
             1.0.2.0/24,,,,,\n",
            &output,
        )
        .run();

        assert_eq!(result.report.status, RebuildStatus::PartialSuccess);
        assert_eq!(result.report.count, 1);
        assert_eq!(result.report.skipped, 1);
        assert_eq!(result.report.errors.len(), 1);
        assert!(result.report.errors[0].starts_with("1.0.1.0/33: "));
        assert!(result.report.is_ok());
    }

    #[test]
    fn test_country_less_garbage_row_is_only_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("city.mmdb");
        let result = rebuilder(
            "1.0.0.0/24,,2077456,,,\n\
             garbage,,,,,\n",
            &output,
        )
        .run();

        assert_eq!(result.report.status, RebuildStatus::Success);
        assert_eq!(result.report.count, 1);
        assert_eq!(result.report.skipped, 1);
        assert!(result.report.errors.is_empty());
    }

    #[test]
    fn test_unreadable_labels_leave_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("city.mmdb");
        fs::write(&output, b"previous").unwrap();

        let result = Rebuilder::from_sources(
            TableSource::path(dir.path().join("missing.csv")),
            BlockSource::new(TableSource::memory(BLOCKS_HEADER.as_bytes())),
            &output,
        )
        .run();

        assert_eq!(result.report.status, RebuildStatus::Error);
        assert!(result.database.is_none());
        assert_eq!(fs::read(&output).unwrap(), b"previous");
    }

    #[test]
    fn test_missing_block_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("city.mmdb");
        let result = Rebuilder::from_sources(
            TableSource::memory(LABELS.as_bytes()),
            BlockSource::new(TableSource::memory(&b"network\n1.0.0.0/24\n"[..])),
            &output,
        )
        .run();

        assert_eq!(result.report.status, RebuildStatus::Error);
        assert!(result.report.message.contains("geoname_id"));
        assert!(!output.exists());
    }

    #[test]
    fn test_persist_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the output directory should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"").unwrap();
        let output = blocker.join("city.mmdb");

        let result = rebuilder("1.0.0.0/24,,2077456,,,\n", &output).run();
        assert_eq!(result.report.status, RebuildStatus::Error);
        assert!(result.report.message.contains("failed to persist"));
    }

    #[test]
    fn test_busy_report_json() {
        let json = serde_json::to_value(RebuildReport::busy()).unwrap();
        assert_eq!(json["status"], "busy");
        assert_eq!(json["count"], 0);
    }

    #[test]
    fn test_persisted_file_is_readonly() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("city.mmdb");
        persist(&crate::GeoIndexBuilder::new().serialize().unwrap(), &output).unwrap();
        assert!(fs::metadata(&output).unwrap().permissions().readonly());

        // A second persist replaces the read-only file
        persist(&crate::GeoIndexBuilder::new().serialize().unwrap(), &output).unwrap();
    }
}
