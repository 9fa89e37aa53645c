//! IPv4 block table ingestion
//!
//! [`BlockSource::rows`] reopens the table and yields one [`BlockOutcome`]
//! per data row. Bad rows become `Invalid` outcomes; only source-level I/O
//! failures surface as `Err`, after which the iterator is exhausted.

use crate::error::{GeoError, Result};
use crate::file_reader::{cell, column, csv_reader, TableSource};
use std::fmt;
use std::io::BufRead;
use std::net::Ipv4Addr;
use std::str::FromStr;

const TABLE: &str = "blocks";

/// An IPv4 CIDR network with host bits cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Network {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Network {
    /// Build a network, clearing bits beyond the prefix
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(GeoError::InvalidNetwork(format!("{}/{}", addr, prefix_len)));
        }
        let bits = u32::from(addr) & mask(prefix_len);
        Ok(Self {
            network: Ipv4Addr::from(bits),
            prefix_len,
        })
    }

    /// First address of the network
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length (0-32)
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Last address of the network
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix_len))
    }

    /// Whether `addr` falls inside this network
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix_len) == u32::from(self.network)
    }
}

fn mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n)),
    }
}

impl FromStr for Ipv4Network {
    type Err = GeoError;

    /// Accepts `a.b.c.d/len` or a bare address (taken as /32)
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.contains(':') {
            return Err(GeoError::UnsupportedNetwork(s.to_string()));
        }
        let invalid = || GeoError::InvalidNetwork(s.to_string());
        let (addr, prefix_len) = match s.split_once('/') {
            Some((addr, len)) => {
                let len = len.parse::<u8>().map_err(|_| invalid())?;
                (addr, len)
            }
            None => (s, 32),
        };
        let addr = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        if prefix_len > 32 {
            return Err(invalid());
        }
        Self::new(addr, prefix_len)
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// One valid row of the block table
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkBlock {
    /// Network the row describes
    pub network: Ipv4Network,
    /// City place identifier, if any
    pub city_place_id: Option<String>,
    /// Country place identifier (never empty)
    pub country_place_id: String,
    /// Latitude
    pub latitude: Option<f64>,
    /// Longitude
    pub longitude: Option<f64>,
    /// Postal code
    pub postal_code: Option<String>,
}

/// Why a row was left out of the build without being an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `registered_country_geoname_id` is blank
    MissingCountry,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingCountry => f.write_str("missing registered country"),
        }
    }
}

/// A row that could not be turned into a block
#[derive(Debug)]
pub struct RowError {
    /// Network text as it appeared in the row
    pub network: String,
    /// What went wrong
    pub error: GeoError,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.network, self.error)
    }
}

/// Result of reading one row
#[derive(Debug)]
pub enum BlockOutcome {
    /// Usable block
    Block(NetworkBlock),
    /// Excluded from the build, not an error
    Skipped {
        /// Network text as it appeared in the row
        network: String,
        /// Why it was left out
        reason: SkipReason,
    },
    /// Malformed row
    Invalid(RowError),
}

/// The IPv4 block table
#[derive(Debug, Clone)]
pub struct BlockSource {
    source: TableSource,
}

struct BlockColumns {
    network: usize,
    city: usize,
    country: usize,
    latitude: usize,
    longitude: usize,
    postal_code: usize,
}

impl BlockSource {
    /// Wrap a table source
    pub fn new(source: TableSource) -> Self {
        Self { source }
    }

    /// Underlying source
    pub fn source(&self) -> &TableSource {
        &self.source
    }

    /// Open the table and stream its rows
    ///
    /// Fails when the table cannot be opened or a required column is absent.
    pub fn rows(&self) -> Result<BlockRows> {
        let (records, columns) = self.open()?;
        Ok(BlockRows {
            records,
            columns,
            line: 1,
            done: false,
        })
    }

    /// Stream the network and place ids of every row, unvalidated
    ///
    /// Rows the build would skip or reject are included; rows the CSV
    /// parser cannot split are not.
    pub fn place_refs(&self) -> Result<PlaceRefRows> {
        let (records, columns) = self.open()?;
        Ok(PlaceRefRows {
            records,
            columns,
            done: false,
        })
    }

    fn open(&self) -> Result<(Records, BlockColumns)> {
        let mut reader = csv_reader(&self.source)?;
        let headers = reader.headers()?.clone();
        let columns = BlockColumns {
            network: column(&headers, TABLE, "network")?,
            city: column(&headers, TABLE, "geoname_id")?,
            country: column(&headers, TABLE, "registered_country_geoname_id")?,
            latitude: column(&headers, TABLE, "latitude")?,
            longitude: column(&headers, TABLE, "longitude")?,
            postal_code: column(&headers, TABLE, "postal_code")?,
        };
        Ok((reader.into_records(), columns))
    }
}

type Records = csv::StringRecordsIntoIter<Box<dyn BufRead + Send>>;

/// Network text and place ids of one row, as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceRefs {
    /// Network cell, trimmed; empty when blank
    pub network: String,
    /// City place identifier, if any
    pub city_place_id: Option<String>,
    /// Country place identifier, if any
    pub country_place_id: Option<String>,
}

/// Lazy iterator over [`PlaceRefs`]
pub struct PlaceRefRows {
    records: Records,
    columns: BlockColumns,
    done: bool,
}

impl Iterator for PlaceRefRows {
    type Item = Result<PlaceRefs>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.records.next()? {
                Ok(record) => {
                    let text = |index| cell(&record, Some(index)).map(str::to_string);
                    return Some(Ok(PlaceRefs {
                        network: text(self.columns.network).unwrap_or_default(),
                        city_place_id: text(self.columns.city),
                        country_place_id: text(self.columns.country),
                    }));
                }
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                Err(_) => continue,
            }
        }
        None
    }
}

/// Lazy iterator over block rows
pub struct BlockRows {
    records: Records,
    columns: BlockColumns,
    line: u64,
    done: bool,
}

impl Iterator for BlockRows {
    type Item = Result<BlockOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = self.records.next()?;
        self.line += 1;
        match record {
            Ok(record) => Some(Ok(parse_row(&record, &self.columns))),
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                self.done = true;
                Some(Err(e.into()))
            }
            Err(e) => Some(Ok(BlockOutcome::Invalid(RowError {
                network: format!("line {}", self.line),
                error: e.into(),
            }))),
        }
    }
}

fn parse_row(record: &csv::StringRecord, cols: &BlockColumns) -> BlockOutcome {
    let network_text = cell(record, Some(cols.network)).unwrap_or_default();
    let invalid = |error| {
        BlockOutcome::Invalid(RowError {
            network: network_text.to_string(),
            error,
        })
    };

    // Country-less rows are left out whatever else is wrong with them
    let Some(country) = cell(record, Some(cols.country)) else {
        return BlockOutcome::Skipped {
            network: network_text.to_string(),
            reason: SkipReason::MissingCountry,
        };
    };
    let network = match network_text.parse::<Ipv4Network>() {
        Ok(network) => network,
        Err(e) => return invalid(e),
    };
    let latitude = match coordinate(record, cols.latitude, "latitude") {
        Ok(v) => v,
        Err(e) => return invalid(e),
    };
    let longitude = match coordinate(record, cols.longitude, "longitude") {
        Ok(v) => v,
        Err(e) => return invalid(e),
    };

    BlockOutcome::Block(NetworkBlock {
        network,
        city_place_id: cell(record, Some(cols.city)).map(str::to_string),
        country_place_id: country.to_string(),
        latitude,
        longitude,
        postal_code: cell(record, Some(cols.postal_code)).map(str::to_string),
    })
}

fn coordinate(
    record: &csv::StringRecord,
    index: usize,
    field: &'static str,
) -> Result<Option<f64>> {
    let Some(text) = cell(record, Some(index)) else {
        return Ok(None);
    };
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(GeoError::InvalidCoordinate {
            field,
            value: text.to_string(),
        }),
    }
}
