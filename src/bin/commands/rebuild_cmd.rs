use anyhow::Result;
use geoatlas::{GeoConfig, Rebuilder};

use crate::cli_utils::print_json;

pub fn cmd_rebuild(config: &GeoConfig) -> Result<()> {
    let report = Rebuilder::new(config).run().report;
    print_json(&report)?;

    if !report.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
