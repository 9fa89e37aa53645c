//! Table source reader with automatic gzip decompression
//!
//! Sources are restartable: every call to [`TableSource::open`] returns a
//! fresh reader positioned at the first byte after any UTF-8 BOM.
//!
//! ```rust,no_run
//! use geoatlas::file_reader::TableSource;
//! use std::io::BufRead;
//!
//! // Files ending in .gz are decompressed transparently
//! let source = TableSource::path("GeoLite2-City-Blocks-IPv4.csv.gz");
//! for line in source.open()?.lines() {
//!     println!("{}", line?);
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

use crate::error::{GeoError, Result};
use flate2::read::GzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Buffer size for table reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where a table's bytes come from
#[derive(Clone)]
pub enum TableSource {
    /// A file on disk, gzip if the extension is `.gz`
    Path(PathBuf),
    /// Bytes already in memory
    Memory(Arc<[u8]>),
}

impl TableSource {
    /// Source backed by a file
    pub fn path(path: impl AsRef<Path>) -> Self {
        TableSource::Path(path.as_ref().to_path_buf())
    }

    /// Source backed by an in-memory buffer
    pub fn memory(bytes: impl Into<Arc<[u8]>>) -> Self {
        TableSource::Memory(bytes.into())
    }

    /// Open a new buffered reader over the source
    pub fn open(&self) -> io::Result<Box<dyn BufRead + Send>> {
        let mut reader: Box<dyn BufRead + Send> = match self {
            TableSource::Path(path) => open(path)?,
            TableSource::Memory(bytes) => Box::new(Cursor::new(Arc::clone(bytes))),
        };
        skip_bom(reader.as_mut())?;
        Ok(reader)
    }
}

impl fmt::Debug for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSource::Path(path) => write!(f, "{}", path.display()),
            TableSource::Memory(bytes) => write!(f, "<memory: {} bytes>", bytes.len()),
        }
    }
}

impl fmt::Display for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Open a file with gzip detection based on file extension
///
/// Files ending in `.gz` (case-insensitive) are decompressed.
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let is_gzip = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gzip {
        let decoder = GzDecoder::new(file);
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}

/// Header-driven CSV reader over a source; short rows are tolerated
pub(crate) fn csv_reader(source: &TableSource) -> io::Result<csv::Reader<Box<dyn BufRead + Send>>> {
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source.open()?))
}

/// Position of a named column in the header row
pub(crate) fn column(
    headers: &csv::StringRecord,
    table: &'static str,
    name: &'static str,
) -> Result<usize> {
    optional_column(headers, name).ok_or(GeoError::MissingColumn { table, column: name })
}

/// Position of a column that may be absent
pub(crate) fn optional_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == name)
}

/// Cell text, `None` when missing or blank
pub(crate) fn cell(record: &csv::StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn skip_bom(reader: &mut dyn BufRead) -> io::Result<()> {
    if reader.fill_buf()?.starts_with(UTF8_BOM) {
        reader.consume(UTF8_BOM.len());
    }
    Ok(())
}
