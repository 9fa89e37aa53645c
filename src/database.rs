//! Read side of the geo index
//!
//! A [`GeoDatabase`] wraps a serialized index, either memory-mapped from
//! disk or held in memory, and answers longest-prefix-match lookups
//! directly against those bytes.
//!
//! ```no_run
//! use geoatlas::GeoDatabase;
//! use std::net::Ipv4Addr;
//!
//! let db = GeoDatabase::open("db/GeoLite2-City-Custom.mmdb")?;
//! if let Some(record) = db.lookup(Ipv4Addr::new(1, 0, 0, 1))? {
//!     println!("{} / {}", record.country.en, record.country.ar);
//! }
//! # Ok::<(), geoatlas::GeoError>(())
//! ```

use crate::data_section::{DataDecoder, DataValue};
use crate::error::{GeoError, Result};
use crate::mmdb::{MmdbHeader, SearchTree};
use crate::record::GeoRecord;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::net::Ipv4Addr;
use std::path::Path;
use xxhash_rust::xxh64::xxh64;

/// Storage for index bytes - either owned or memory-mapped
enum DatabaseStorage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl DatabaseStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            DatabaseStorage::Owned(v) => v.as_slice(),
            DatabaseStorage::Mmap(m) => &m[..],
        }
    }
}

/// A record found by [`GeoDatabase::lookup_with_depth`]
#[derive(Debug, Clone, PartialEq)]
pub struct LookupMatch {
    /// The stored record
    pub record: GeoRecord,
    /// Tree depth at which the walk reached the record
    ///
    /// This is at least the prefix length of the owning network and can be
    /// larger: when a more specific network splits an edge, addresses beside
    /// it are answered from the copied record one level further down.
    pub depth: u8,
}

/// Result of [`GeoDatabase::verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumReport {
    /// Value written into the metadata, if any
    pub stored: Option<u64>,
    /// Value computed over the tree and data section
    pub computed: u64,
}

impl ChecksumReport {
    /// True when a stored checksum exists and matches
    pub fn is_valid(&self) -> bool {
        self.stored == Some(self.computed)
    }
}

/// Serialized geo index opened for lookups
pub struct GeoDatabase {
    data: DatabaseStorage,
    header: MmdbHeader,
}

impl GeoDatabase {
    /// Memory-map an index file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: persisted indexes are replaced by rename, never rewritten in place
        let mmap = unsafe { Mmap::map(&file) }?;
        Self::from_storage(DatabaseStorage::Mmap(mmap))
    }

    /// Wrap bytes produced by [`crate::GeoIndexBuilder::serialize`]
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(DatabaseStorage::Owned(data))
    }

    fn from_storage(storage: DatabaseStorage) -> Result<Self> {
        let header = MmdbHeader::from_file(storage.as_slice())?;
        Ok(Self {
            data: storage,
            header,
        })
    }

    /// Longest-prefix-match lookup
    ///
    /// `Ok(None)` means no stored network covers the address.
    pub fn lookup(&self, addr: Ipv4Addr) -> Result<Option<GeoRecord>> {
        Ok(self.lookup_with_depth(addr)?.map(|m| m.record))
    }

    /// Lookup that also reports the tree depth of the match
    pub fn lookup_with_depth(&self, addr: Ipv4Addr) -> Result<Option<LookupMatch>> {
        let bytes = self.data.as_slice();
        let tree = SearchTree::new(bytes, &self.header);
        let Some(hit) = tree.lookup_v4(addr)? else {
            return Ok(None);
        };

        let value = self.decode(hit.data_offset)?;
        let record = GeoRecord::from_data_value(&value).ok_or_else(|| {
            GeoError::Decode(format!(
                "record at offset {} is not a map",
                hit.data_offset
            ))
        })?;
        Ok(Some(LookupMatch {
            record,
            depth: hit.depth,
        }))
    }

    fn decode(&self, offset: u32) -> Result<DataValue> {
        DataDecoder::new(self.header.data_section(self.data.as_slice()))
            .decode(offset)
            .map_err(|e| GeoError::Decode(format!("offset {}: {}", offset, e)))
    }

    /// Decoded metadata map
    pub fn metadata(&self) -> Result<DataValue> {
        Ok(self.header.metadata(self.data.as_slice())?)
    }

    fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata().ok()?.get_path(&[key]).and_then(DataValue::as_u64)
    }

    /// `database_type` from the metadata
    pub fn database_type(&self) -> Option<String> {
        self.metadata()
            .ok()?
            .get_path(&["database_type"])
            .and_then(DataValue::as_str)
            .map(str::to_string)
    }

    /// Number of networks inserted when the index was built
    pub fn record_count(&self) -> Option<u64> {
        self.metadata_u64("record_count")
    }

    /// Number of nodes in the search tree
    pub fn node_count(&self) -> u32 {
        self.header.node_count
    }

    /// Record width in bits
    pub fn record_size(&self) -> u16 {
        self.header.record_size.bits()
    }

    /// Size of the index in bytes
    pub fn len(&self) -> usize {
        self.data.as_slice().len()
    }

    /// True for a zero-length index (never the case for an opened file)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the index is memory-mapped rather than owned
    pub fn is_mapped(&self) -> bool {
        matches!(self.data, DatabaseStorage::Mmap(_))
    }

    /// Recompute the xxh64 checksum of the tree and data section
    pub fn verify(&self) -> ChecksumReport {
        let computed = xxh64(&self.data.as_slice()[..self.header.data_end], 0);
        ChecksumReport {
            stored: self.metadata_u64("data_checksum"),
            computed,
        }
    }
}

impl fmt::Debug for GeoDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoDatabase")
            .field("bytes", &self.len())
            .field("node_count", &self.header.node_count)
            .field("record_size", &self.record_size())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::Ipv4Network;
    use crate::index_builder::GeoIndexBuilder;
    use crate::mmdb::FormatError;
    use std::io::Write;

    fn record(iso: &str, lat: f64) -> GeoRecord {
        let mut record = GeoRecord::fallback();
        record.country.iso_code = iso.to_string();
        record.location.latitude = Some(lat);
        record
    }

    fn build(entries: &[(&str, GeoRecord)]) -> Vec<u8> {
        let mut builder = GeoIndexBuilder::new();
        for (net, record) in entries {
            builder
                .insert(&net.parse::<Ipv4Network>().unwrap(), record)
                .unwrap();
        }
        builder.serialize().unwrap()
    }

    #[test]
    fn test_lookup_from_bytes() {
        let db = GeoDatabase::from_bytes(build(&[
            ("192.168.0.0/16", record("AA", 1.0)),
            ("192.168.1.0/24", record("BB", 2.0)),
        ]))
        .unwrap();

        let hit = db
            .lookup_with_depth(Ipv4Addr::new(192, 168, 1, 9))
            .unwrap()
            .unwrap();
        assert_eq!(hit.record.country.iso_code, "BB");
        assert_eq!(hit.depth, 24);

        let broad = db.lookup(Ipv4Addr::new(192, 168, 2, 9)).unwrap().unwrap();
        assert_eq!(broad.country.iso_code, "AA");
        assert_eq!(broad.location.latitude, Some(1.0));

        assert!(db.lookup(Ipv4Addr::new(10, 0, 0, 1)).unwrap().is_none());
        assert!(!db.is_mapped());
    }

    #[test]
    fn test_open_mmap() {
        let bytes = build(&[("8.8.8.0/24", record("US", 37.751))]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let db = GeoDatabase::open(file.path()).unwrap();
        assert!(db.is_mapped());
        assert_eq!(db.len(), bytes.len());
        let hit = db.lookup(Ipv4Addr::new(8, 8, 8, 8)).unwrap().unwrap();
        assert_eq!(hit.country.iso_code, "US");
    }

    #[test]
    fn test_inspection_accessors() {
        let db = GeoDatabase::from_bytes(build(&[
            ("1.0.0.0/24", record("AU", 1.0)),
            ("2.0.0.0/24", record("FR", 2.0)),
        ]))
        .unwrap();
        assert_eq!(db.record_count(), Some(2));
        assert_eq!(db.record_size(), 24);
        assert!(db.node_count() > 0);
        assert_eq!(db.database_type().as_deref(), Some("GeoLite2-City-Custom"));
        assert!(db.verify().is_valid());
    }

    #[test]
    fn test_verify_detects_corruption() {
        let mut bytes = build(&[("1.0.0.0/24", record("AU", 1.0))]);
        let header = MmdbHeader::from_file(&bytes).unwrap();
        // Flip a byte inside a data section string
        bytes[header.data_end - 1] ^= 0x20;
        let db = GeoDatabase::from_bytes(bytes).unwrap();
        assert!(!db.verify().is_valid());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = GeoDatabase::from_bytes(vec![0u8; 64]).unwrap_err();
        assert!(matches!(err, GeoError::Format(FormatError::MetadataNotFound)));
    }

    #[test]
    fn test_missing_file() {
        let err = GeoDatabase::open("/nonexistent/geoatlas.mmdb").unwrap_err();
        assert!(matches!(err, GeoError::Io(_)));
    }
}
