//! MMDB-specific Type Definitions
//!
//! Constants and small types shared by the index writer and reader.

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Zero bytes between the search tree and the data section
pub const DATA_SECTION_SEPARATOR: [u8; 16] = [0u8; 16];

/// Binary format major version written to and required from metadata
pub const FORMAT_MAJOR_VERSION: u16 = 2;

/// Binary format minor version written to metadata
pub const FORMAT_MINOR_VERSION: u16 = 0;

/// Errors raised while reading a persisted index
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Structural problem in the tree or sections
    #[error("invalid MMDB format: {0}")]
    InvalidFormat(String),
    /// Metadata marker not present
    #[error("MMDB metadata marker not found")]
    MetadataNotFound,
    /// Metadata present but unusable
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    /// Major version or IP version differs from what this reader understands
    #[error("unsupported index: {0}")]
    Unsupported(String),
    /// Data section decode failure
    #[error("data decode error: {0}")]
    DecodeError(String),
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Largest record value this size can hold
    pub fn max_value(self) -> u64 {
        match self {
            RecordSize::Bits24 => (1 << 24) - 1,
            RecordSize::Bits28 => (1 << 28) - 1,
            RecordSize::Bits32 => u32::MAX as u64,
        }
    }

    /// Smallest record size able to address `node_count + 16 + data_len`
    pub fn smallest_for(node_count: u32, data_len: usize) -> Option<Self> {
        let largest = node_count as u64 + 16 + data_len as u64;
        [RecordSize::Bits24, RecordSize::Bits28, RecordSize::Bits32]
            .into_iter()
            .find(|size| largest <= size.max_value())
    }

    /// Number of bits, as written to metadata
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Create from bit size
    pub fn from_bits(bits: u16) -> Result<Self, FormatError> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(FormatError::InvalidFormat(format!(
                "Invalid record size: {} bits",
                bits
            ))),
        }
    }
}
