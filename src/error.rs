/// Error types for the geoatlas library
use crate::mmdb::FormatError;
use std::io;

/// Result type alias for geoatlas operations
pub type Result<T> = std::result::Result<T, GeoError>;

/// Main error type for build and lookup operations
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// I/O errors (source tables, persisted index)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from a table header
    #[error("{table} table is missing required column '{column}'")]
    MissingColumn {
        /// Which table (labels or blocks)
        table: &'static str,
        /// Column name
        column: &'static str,
    },

    /// Network could not be parsed as IPv4 CIDR
    #[error("invalid network '{0}'")]
    InvalidNetwork(String),

    /// IPv6 networks cannot be stored in the IPv4 index
    #[error("IPv6 network '{0}' is not supported by the IPv4 index")]
    UnsupportedNetwork(String),

    /// Latitude or longitude is not numeric
    #[error("invalid {field} '{value}'")]
    InvalidCoordinate {
        /// latitude or longitude
        field: &'static str,
        /// Raw cell text
        value: String,
    },

    /// Persisted index format problems
    #[error("index format error: {0}")]
    Format(#[from] FormatError),

    /// Tree plus data section cannot be addressed by any record size
    #[error("index too large: {0}")]
    IndexTooLarge(String),

    /// Record data could not be decoded
    #[error("record decode error: {0}")]
    Decode(String),

    /// Writing the new index into place failed
    #[error("failed to persist index to {path}: {message}")]
    Persist {
        /// Destination path
        path: String,
        /// Underlying failure
        message: String,
    },

    /// No index has been loaded yet
    #[error("no index loaded from {0}")]
    NotLoaded(String),

    /// Another rebuild holds the writer guard
    #[error("a rebuild is already in progress")]
    Busy,
}
