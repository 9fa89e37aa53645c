//! GeoAtlas - Bilingual IPv4 Geolocation Index
//!
//! GeoAtlas builds a MaxMind DB (MMDB) city database from two CSV tables,
//! a place-name table keyed by `(geoname_id, locale)` and an IPv4 block
//! table, and answers longest-prefix-match lookups in English and Arabic.
//!
//! # Quick Start
//!
//! ```rust
//! use geoatlas::{GeoDatabase, GeoIndexBuilder, GeoRecord, Ipv4Network};
//! use std::net::Ipv4Addr;
//!
//! let mut record = GeoRecord::fallback();
//! record.country.iso_code = "SA".to_string();
//! record.country.ar = "السعودية".to_string();
//!
//! let mut builder = GeoIndexBuilder::new();
//! builder.insert(&"5.1.0.0/16".parse::<Ipv4Network>()?, &record)?;
//! let db = GeoDatabase::from_bytes(builder.serialize()?)?;
//!
//! let found = db.lookup(Ipv4Addr::new(5, 1, 2, 3))?.expect("covered");
//! assert_eq!(found.country.ar, "السعودية");
//! # Ok::<(), geoatlas::GeoError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   ┌────────────────┐
//! │ Locations CSV  │   │  Blocks CSV    │
//! └───────┬────────┘   └───────┬────────┘
//!         ↓ LabelStore          ↓ BlockSource (streamed)
//!         └──────────┬──────────┘
//!                    ↓ merge
//!            GeoIndexBuilder → .mmdb (atomic rename)
//!                    ↓ mmap
//!              GeoDatabase → resolve()
//! ```
//!
//! [`GeoService`] ties these together for long-running use: queries read
//! an atomically swapped snapshot while [`GeoService::rebuild`] runs.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Block table ingestion
pub mod blocks;
pub mod config;
/// Data section encoding/decoding for MMDB v2
pub mod data_section;
pub mod database;
/// Error types for geoatlas operations
pub mod error;
pub mod file_reader;
pub mod index_builder;
/// IP tree builder for MMDB format
pub mod ip_tree_builder;
pub mod labels;
pub mod merge;
/// MMDB format implementation (internal)
mod mmdb;
pub mod query;
pub mod rebuild;
pub mod record;
pub mod sample;
pub mod service;

pub use crate::blocks::{BlockOutcome, BlockSource, Ipv4Network, NetworkBlock, RowError};
pub use crate::config::GeoConfig;
pub use crate::data_section::DataValue;
pub use crate::database::GeoDatabase;
pub use crate::error::{GeoError, Result};
pub use crate::file_reader::TableSource;
pub use crate::index_builder::GeoIndexBuilder;
pub use crate::labels::{LabelStore, Locale, PlaceLabel};
pub use crate::merge::merge;
pub use crate::mmdb::FormatError;
pub use crate::query::{resolve, resolve_my_ip, GeoResponse, MyIp, Resolution};
pub use crate::rebuild::{RebuildReport, RebuildStatus, Rebuilder};
pub use crate::record::GeoRecord;
pub use crate::service::GeoService;

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
