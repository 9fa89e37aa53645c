//! MMDB Binary Format Parsing
//!
//! Only the header fields needed for lookups are extracted; the tree and
//! the data section stay in the mapped file.
//!
//! Layout produced by [`crate::index_builder`]:
//!
//! ```text
//! [ search tree: node_count * node_bytes ]
//! [ 16 zero bytes                        ]
//! [ data section                         ]
//! [ \xAB\xCD\xEFMaxMind.com              ]
//! [ metadata map                         ]
//! ```

use super::types::{FormatError, RecordSize, FORMAT_MAJOR_VERSION, METADATA_MARKER};
use crate::data_section::{DataDecoder, DataValue};

/// Metadata is searched for in the trailing 128KB, as libmaxminddb does
const METADATA_SEARCH_WINDOW: usize = 128 * 1024;

/// MMDB file header
#[derive(Debug, Clone, Copy)]
pub struct MmdbHeader {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// Start of the data section (after the separator)
    pub data_start: usize,
    /// End of the data section (start of the metadata marker)
    pub data_end: usize,
    /// Start of the metadata map (after the marker)
    pub metadata_start: usize,
}

impl MmdbHeader {
    /// Parse MMDB bytes and validate the header fields
    ///
    /// Rejects files whose major format version or IP version this reader
    /// does not understand instead of misreading them.
    pub fn from_file(data: &[u8]) -> Result<Self, FormatError> {
        let marker_offset = find_metadata_marker(data)?;
        let metadata_start = marker_offset + METADATA_MARKER.len();
        let metadata = decode_metadata(&data[metadata_start..])?;

        let map = metadata
            .as_map()
            .ok_or_else(|| FormatError::InvalidMetadata("Metadata is not a map".to_string()))?;

        let major = extract_uint(map, "binary_format_major_version")?;
        if major != FORMAT_MAJOR_VERSION as u64 {
            return Err(FormatError::Unsupported(format!(
                "binary format major version {} (expected {})",
                major, FORMAT_MAJOR_VERSION
            )));
        }

        let ip_version = extract_uint(map, "ip_version")?;
        if ip_version != 4 {
            return Err(FormatError::Unsupported(format!(
                "ip_version {} (only IPv4 indexes are supported)",
                ip_version
            )));
        }

        let node_count = extract_uint(map, "node_count")?;
        let node_count = u32::try_from(node_count)
            .map_err(|_| FormatError::InvalidMetadata(format!("node_count {} too large", node_count)))?;
        let record_size = RecordSize::from_bits(extract_uint(map, "record_size")? as u16)?;

        let tree_size = node_count as usize * record_size.node_bytes();
        let data_start = tree_size + 16;
        if data_start > marker_offset {
            return Err(FormatError::InvalidFormat(format!(
                "search tree ({} bytes) overlaps metadata at {}",
                tree_size, marker_offset
            )));
        }

        Ok(MmdbHeader {
            node_count,
            record_size,
            tree_size,
            data_start,
            data_end: marker_offset,
            metadata_start,
        })
    }

    /// Decode the full metadata map (allocates)
    pub fn metadata(&self, data: &[u8]) -> Result<DataValue, FormatError> {
        decode_metadata(&data[self.metadata_start..])
    }

    /// The data section slice, relative to which tree pointers are resolved
    pub fn data_section<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.data_start..self.data_end]
    }
}

fn decode_metadata(bytes: &[u8]) -> Result<DataValue, FormatError> {
    DataDecoder::new(bytes)
        .decode(0)
        .map_err(|e| FormatError::InvalidMetadata(format!("Failed to decode metadata: {}", e)))
}

/// Find the metadata marker (the last occurrence in the trailing window)
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, FormatError> {
    let search_start = data.len().saturating_sub(METADATA_SEARCH_WINDOW);
    memchr::memmem::rfind(&data[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(FormatError::MetadataNotFound)
}

fn extract_uint(
    map: &std::collections::BTreeMap<String, DataValue>,
    key: &str,
) -> Result<u64, FormatError> {
    match map.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            FormatError::InvalidMetadata(format!("Field '{}' is not an unsigned integer", key))
        }),
        None => Err(FormatError::InvalidMetadata(format!(
            "Required field '{}' not found",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_section::DataEncoder;
    use std::collections::BTreeMap;

    fn file_with_metadata(entries: &[(&str, DataValue)], tree_bytes: usize) -> Vec<u8> {
        let map: BTreeMap<String, DataValue> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let mut file = vec![0u8; tree_bytes + 16];
        file.extend_from_slice(METADATA_MARKER);
        file.extend_from_slice(&DataEncoder::encode_standalone(&DataValue::Map(map)));
        file
    }

    fn valid_entries() -> Vec<(&'static str, DataValue)> {
        vec![
            ("binary_format_major_version", DataValue::Uint16(2)),
            ("ip_version", DataValue::Uint16(4)),
            ("node_count", DataValue::Uint32(1)),
            ("record_size", DataValue::Uint16(24)),
        ]
    }

    #[test]
    fn test_parse_header() {
        let file = file_with_metadata(&valid_entries(), 6);
        let header = MmdbHeader::from_file(&file).unwrap();
        assert_eq!(header.node_count, 1);
        assert_eq!(header.record_size, RecordSize::Bits24);
        assert_eq!(header.tree_size, 6);
        assert_eq!(header.data_start, 22);
        assert_eq!(header.data_end, 22);
    }

    #[test]
    fn test_major_version_mismatch_is_rejected() {
        let mut entries = valid_entries();
        entries[0].1 = DataValue::Uint16(3);
        let file = file_with_metadata(&entries, 6);
        assert!(matches!(
            MmdbHeader::from_file(&file),
            Err(FormatError::Unsupported(_))
        ));
    }

    #[test]
    fn test_ipv6_index_is_rejected() {
        let mut entries = valid_entries();
        entries[1].1 = DataValue::Uint16(6);
        let file = file_with_metadata(&entries, 6);
        assert!(matches!(
            MmdbHeader::from_file(&file),
            Err(FormatError::Unsupported(_))
        ));
    }

    #[test]
    fn test_tree_larger_than_file_is_rejected() {
        let mut entries = valid_entries();
        entries[2].1 = DataValue::Uint32(1000);
        let file = file_with_metadata(&entries, 6);
        assert!(matches!(
            MmdbHeader::from_file(&file),
            Err(FormatError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_missing_field() {
        let file = file_with_metadata(&valid_entries()[..3], 6);
        assert!(matches!(
            MmdbHeader::from_file(&file),
            Err(FormatError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_metadata_not_found() {
        let data = b"not a valid mmdb file";
        assert_eq!(find_metadata_marker(data), Err(FormatError::MetadataNotFound));
    }
}
