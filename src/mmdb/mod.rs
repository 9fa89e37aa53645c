//! MaxMind DB (MMDB) reader internals
//!
//! - **types**: constants, record sizes, format errors
//! - **format**: header and metadata parsing
//! - **tree**: search tree traversal for IPv4 lookups
//!
//! Data decoding reuses `crate::data_section::DataDecoder`.

pub mod format;
pub mod tree;
pub mod types;

pub use format::MmdbHeader;
pub use tree::SearchTree;
pub use types::{
    FormatError, RecordSize, DATA_SECTION_SEPARATOR, FORMAT_MAJOR_VERSION, FORMAT_MINOR_VERSION,
    METADATA_MARKER,
};
