//! Service configuration

use crate::file_reader::TableSource;
use crate::index_builder::DEFAULT_DATABASE_TYPE;
use std::path::PathBuf;

/// Default locations table
pub const DEFAULT_LABELS_CSV: &str = "./db/GeoLite2-City-Locations.csv";
/// Default IPv4 blocks table
pub const DEFAULT_BLOCKS_CSV: &str = "./db/GeoLite2-City-Blocks-IPv4.csv";
/// Default persisted index
pub const DEFAULT_DATABASE: &str = "./db/GeoLite2-City-Custom.mmdb";
/// Default number of rows returned by the sample listing
pub const DEFAULT_SAMPLE_LIMIT: usize = 100;

/// Paths and settings shared by queries and rebuilds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoConfig {
    /// Place-name table (`.csv` or `.csv.gz`)
    pub labels_csv: PathBuf,
    /// IPv4 block table (`.csv` or `.csv.gz`)
    pub blocks_csv: PathBuf,
    /// Where the built index is written and served from
    pub database: PathBuf,
    /// `database_type` written into the index metadata
    pub database_type: String,
    /// Rows returned by the sample listing when no limit is given
    pub sample_limit: usize,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            labels_csv: PathBuf::from(DEFAULT_LABELS_CSV),
            blocks_csv: PathBuf::from(DEFAULT_BLOCKS_CSV),
            database: PathBuf::from(DEFAULT_DATABASE),
            database_type: DEFAULT_DATABASE_TYPE.to_string(),
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

impl GeoConfig {
    /// Config rooted in one directory using the default file names
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let file_name = |default: &str| {
            dir.join(
                PathBuf::from(default)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_default(),
            )
        };
        Self {
            labels_csv: file_name(DEFAULT_LABELS_CSV),
            blocks_csv: file_name(DEFAULT_BLOCKS_CSV),
            database: file_name(DEFAULT_DATABASE),
            ..Self::default()
        }
    }

    /// Label table as a readable source
    pub fn labels_source(&self) -> TableSource {
        TableSource::path(&self.labels_csv)
    }

    /// Block table as a readable source
    pub fn blocks_source(&self) -> TableSource {
        TableSource::path(&self.blocks_csv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GeoConfig::default();
        assert_eq!(config.database, PathBuf::from("./db/GeoLite2-City-Custom.mmdb"));
        assert_eq!(config.database_type, "GeoLite2-City-Custom");
        assert_eq!(config.sample_limit, 100);
    }

    #[test]
    fn test_in_dir() {
        let config = GeoConfig::in_dir("/srv/geo");
        assert_eq!(
            config.labels_csv,
            PathBuf::from("/srv/geo/GeoLite2-City-Locations.csv")
        );
        assert_eq!(
            config.blocks_csv,
            PathBuf::from("/srv/geo/GeoLite2-City-Blocks-IPv4.csv")
        );
        assert_eq!(
            config.database,
            PathBuf::from("/srv/geo/GeoLite2-City-Custom.mmdb")
        );
    }
}
