use anyhow::Result;
use geoatlas::{resolve, GeoConfig, GeoDatabase, Resolution};
use log::warn;

use crate::cli_utils::print_json;

pub fn cmd_query(config: &GeoConfig, addresses: Vec<String>) -> Result<()> {
    // An unreadable index is reported per address, like the service does
    let db = match GeoDatabase::open(&config.database) {
        Ok(db) => Some(db),
        Err(e) => {
            warn!("Failed to load index {}: {}", config.database.display(), e);
            None
        }
    };

    let results: Vec<Resolution> = addresses
        .iter()
        .map(|address| resolve(address, db.as_ref()))
        .collect();

    // Single address: bare object; several: array
    match results.as_slice() {
        [single] => print_json(single),
        _ => print_json(&results),
    }
}
