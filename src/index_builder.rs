//! Geo index builder
//!
//! Collects `(network, record)` pairs and serializes them as a MaxMind DB
//! v2 file:
//!
//! ```text
//! [search tree][16 zero bytes][data section][\xAB\xCD\xEFMaxMind.com][metadata]
//! ```
//!
//! Records are encoded as they are inserted; identical records share one
//! copy in the data section.

use crate::blocks::Ipv4Network;
use crate::data_section::{DataEncoder, DataValue};
use crate::error::Result;
use crate::ip_tree_builder::IpTreeBuilder;
use crate::labels::Locale;
use crate::mmdb::{
    DATA_SECTION_SEPARATOR, FORMAT_MAJOR_VERSION, FORMAT_MINOR_VERSION, METADATA_MARKER,
};
use crate::record::GeoRecord;
use std::collections::BTreeMap;
use xxhash_rust::xxh64::xxh64;

/// Database type written when none is configured
pub const DEFAULT_DATABASE_TYPE: &str = "GeoLite2-City-Custom";

/// Builds a serialized geo index
pub struct GeoIndexBuilder {
    tree: IpTreeBuilder,
    data: DataEncoder,
    record_count: u64,
    database_type: String,
    description: BTreeMap<String, String>,
    build_epoch: Option<u64>,
}

impl GeoIndexBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        let mut description = BTreeMap::new();
        description.insert(
            Locale::En.code().to_string(),
            "Bilingual IPv4 city database".to_string(),
        );
        description.insert(
            Locale::Ar.code().to_string(),
            "قاعدة بيانات المدن لعناوين IPv4 بلغتين".to_string(),
        );
        Self {
            tree: IpTreeBuilder::new(),
            data: DataEncoder::new(),
            record_count: 0,
            database_type: DEFAULT_DATABASE_TYPE.to_string(),
            description,
            build_epoch: None,
        }
    }

    /// Set the `database_type` metadata value
    pub fn with_database_type(mut self, db_type: impl Into<String>) -> Self {
        self.database_type = db_type.into();
        self
    }

    /// Set the description for one language
    pub fn with_description(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.description.insert(language.into(), text.into());
        self
    }

    /// Pin `build_epoch` instead of using the current time
    pub fn with_build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = Some(epoch);
        self
    }

    /// Add one network
    ///
    /// The same network inserted twice keeps the later record.
    pub fn insert(&mut self, network: &Ipv4Network, record: &GeoRecord) -> Result<()> {
        let offset = self.data.encode(&record.to_data_value());
        self.tree
            .insert(network.network(), network.prefix_len(), offset)?;
        self.record_count += 1;
        Ok(())
    }

    /// Number of successful inserts
    pub fn len(&self) -> u64 {
        self.record_count
    }

    /// True when nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Produce the file bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data_section = self.data.as_bytes();
        let tree = self.tree.build(data_section.len())?;

        let mut database =
            Vec::with_capacity(tree.bytes.len() + DATA_SECTION_SEPARATOR.len() + data_section.len());
        database.extend_from_slice(&tree.bytes);
        database.extend_from_slice(&DATA_SECTION_SEPARATOR);
        database.extend_from_slice(data_section);
        let checksum = xxh64(&database, 0);

        let build_epoch = self
            .build_epoch
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "binary_format_major_version".to_string(),
            DataValue::Uint16(FORMAT_MAJOR_VERSION),
        );
        metadata.insert(
            "binary_format_minor_version".to_string(),
            DataValue::Uint16(FORMAT_MINOR_VERSION),
        );
        metadata.insert("build_epoch".to_string(), DataValue::Uint64(build_epoch));
        metadata.insert(
            "database_type".to_string(),
            DataValue::String(self.database_type.clone()),
        );
        metadata.insert(
            "description".to_string(),
            DataValue::Map(
                self.description
                    .iter()
                    .map(|(k, v)| (k.clone(), DataValue::String(v.clone())))
                    .collect(),
            ),
        );
        metadata.insert(
            "languages".to_string(),
            DataValue::Array(
                Locale::ALL
                    .iter()
                    .map(|l| DataValue::String(l.code().to_string()))
                    .collect(),
            ),
        );
        metadata.insert("ip_version".to_string(), DataValue::Uint16(4));
        metadata.insert("node_count".to_string(), DataValue::Uint32(tree.node_count));
        metadata.insert(
            "record_size".to_string(),
            DataValue::Uint16(tree.record_size.bits()),
        );
        metadata.insert(
            "record_count".to_string(),
            DataValue::Uint64(self.record_count),
        );
        metadata.insert("data_checksum".to_string(), DataValue::Uint64(checksum));

        database.extend_from_slice(METADATA_MARKER);
        database.extend_from_slice(&DataEncoder::encode_standalone(&DataValue::Map(metadata)));
        Ok(database)
    }
}

impl Default for GeoIndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmdb::{MmdbHeader, SearchTree};
    use crate::data_section::DataDecoder;
    use std::net::Ipv4Addr;

    fn record(iso: &str) -> GeoRecord {
        let mut record = GeoRecord::fallback();
        record.country.iso_code = iso.to_string();
        record
    }

    fn lookup(bytes: &[u8], addr: Ipv4Addr) -> Option<String> {
        let header = MmdbHeader::from_file(bytes).unwrap();
        let hit = SearchTree::new(bytes, &header).lookup_v4(addr).unwrap()?;
        let value = DataDecoder::new(header.data_section(bytes))
            .decode(hit.data_offset)
            .unwrap();
        GeoRecord::from_data_value(&value).map(|r| r.country.iso_code)
    }

    #[test]
    fn test_metadata_fields() {
        let mut builder = GeoIndexBuilder::new().with_build_epoch(1_700_000_000);
        builder
            .insert(&"1.0.0.0/24".parse().unwrap(), &record("AU"))
            .unwrap();
        let bytes = builder.serialize().unwrap();

        let header = MmdbHeader::from_file(&bytes).unwrap();
        let meta = header.metadata(&bytes).unwrap();
        let field = |k: &str| meta.get_path(&[k]).and_then(DataValue::as_u64);
        assert_eq!(field("binary_format_major_version"), Some(2));
        assert_eq!(field("ip_version"), Some(4));
        assert_eq!(field("record_count"), Some(1));
        assert_eq!(field("build_epoch"), Some(1_700_000_000));
        assert_eq!(field("record_size"), Some(24));
        assert_eq!(
            meta.get_path(&["database_type"]).and_then(DataValue::as_str),
            Some(DEFAULT_DATABASE_TYPE)
        );
        assert_eq!(
            meta.get_path(&["languages"]),
            Some(&DataValue::Array(vec![
                DataValue::String("en".to_string()),
                DataValue::String("ar".to_string()),
            ]))
        );
        let checksum = xxh64(&bytes[..header.data_end], 0);
        assert_eq!(field("data_checksum"), Some(checksum));
    }

    #[test]
    fn test_serialized_lookups() {
        let mut builder = GeoIndexBuilder::new();
        builder.insert(&"10.0.0.0/8".parse().unwrap(), &record("AA")).unwrap();
        builder.insert(&"10.1.0.0/16".parse().unwrap(), &record("BB")).unwrap();
        let bytes = builder.serialize().unwrap();

        assert_eq!(lookup(&bytes, Ipv4Addr::new(10, 1, 2, 3)).as_deref(), Some("BB"));
        assert_eq!(lookup(&bytes, Ipv4Addr::new(10, 2, 0, 0)).as_deref(), Some("AA"));
        assert_eq!(lookup(&bytes, Ipv4Addr::new(11, 0, 0, 0)), None);
    }

    #[test]
    fn test_identical_records_are_stored_once() {
        let mut one = GeoIndexBuilder::new().with_build_epoch(0);
        one.insert(&"10.0.0.0/8".parse().unwrap(), &record("AA")).unwrap();
        let mut two = GeoIndexBuilder::new().with_build_epoch(0);
        two.insert(&"10.0.0.0/8".parse().unwrap(), &record("AA")).unwrap();
        two.insert(&"12.0.0.0/8".parse().unwrap(), &record("AA")).unwrap();

        assert_eq!(one.data.size(), two.data.size());
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn test_empty_index_is_valid() {
        let bytes = GeoIndexBuilder::new().serialize().unwrap();
        assert_eq!(lookup(&bytes, Ipv4Addr::new(8, 8, 8, 8)), None);
    }

    #[test]
    fn test_custom_database_type() {
        let bytes = GeoIndexBuilder::new()
            .with_database_type("Test-City")
            .serialize()
            .unwrap();
        let header = MmdbHeader::from_file(&bytes).unwrap();
        let meta = header.metadata(&bytes).unwrap();
        assert_eq!(
            meta.get_path(&["database_type"]).and_then(DataValue::as_str),
            Some("Test-City")
        );
    }
}
