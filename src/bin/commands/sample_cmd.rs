use anyhow::Result;
use geoatlas::sample::SampleListing;
use geoatlas::{GeoConfig, GeoService};

use crate::cli_utils::print_json;

pub fn cmd_sample(config: GeoConfig, limit: Option<usize>) -> Result<()> {
    let service = GeoService::open(config);
    let listing = service.list_sample(limit);
    print_json(&listing)?;

    if matches!(listing, SampleListing::Failed { .. }) {
        std::process::exit(1);
    }
    Ok(())
}
