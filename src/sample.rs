//! Preview of the first block rows merged with their labels

use crate::blocks::{BlockSource, Ipv4Network};
use crate::error::Result;
use crate::labels::LabelStore;
use crate::merge::merge_places;
use crate::record::{CityInfo, ContinentInfo, CountryInfo};
use serde::Serialize;

/// One block row merged with the current labels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSummary {
    /// CIDR network text
    pub network: String,
    /// Country part
    pub country: CountryInfo,
    /// City part
    pub city: CityInfo,
    /// Continent part
    pub continent: ContinentInfo,
}

/// Body of the sample listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleListing {
    /// Rows read successfully
    Networks {
        /// Up to `limit` summaries in table order
        ip_networks: Vec<NetworkSummary>,
    },
    /// The block table could not be read
    Failed {
        /// What went wrong
        error: String,
    },
}

/// First `limit` rows of the block table that name a network
///
/// Rows the build would skip or reject are listed too: a missing country
/// merges to the fallbacks, and network text that does not parse is shown
/// as written.
pub fn sample(blocks: &BlockSource, labels: &LabelStore, limit: usize) -> Result<Vec<NetworkSummary>> {
    let mut summaries = Vec::with_capacity(limit.min(1024));
    if limit == 0 {
        return Ok(summaries);
    }
    for refs in blocks.place_refs()? {
        let refs = refs?;
        if refs.network.is_empty() {
            continue;
        }
        let record = merge_places(
            refs.country_place_id.as_deref().unwrap_or_default(),
            refs.city_place_id.as_deref(),
            labels,
        );
        let network = match refs.network.parse::<Ipv4Network>() {
            Ok(network) => network.to_string(),
            Err(_) => refs.network,
        };
        summaries.push(NetworkSummary {
            network,
            country: record.country,
            city: record.city,
            continent: record.continent,
        });
        if summaries.len() >= limit {
            break;
        }
    }
    Ok(summaries)
}
