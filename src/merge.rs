//! Joins a block row with its labels
//!
//! Codes and the time zone come from the country labels, Arabic first. Names
//! come from the label in their own locale. Anything missing takes the
//! fallback from [`crate::record`].

use crate::blocks::NetworkBlock;
use crate::labels::{LabelStore, Locale, PlaceLabel};
use crate::record::{
    CityInfo, ContinentInfo, CountryInfo, GeoRecord, LocationInfo, UNKNOWN_AR,
    UNKNOWN_CONTINENT_CODE, UNKNOWN_EN, UNKNOWN_ISO_CODE, UNKNOWN_TIME_ZONE,
};

/// Build the stored record for one block
pub fn merge(block: &NetworkBlock, labels: &LabelStore) -> GeoRecord {
    let mut record = merge_places(
        &block.country_place_id,
        block.city_place_id.as_deref(),
        labels,
    );
    record.location.latitude = block.latitude;
    record.location.longitude = block.longitude;
    record.location.postal_code = block.postal_code.clone();
    record
}

/// Names, codes and time zone for a pair of place ids
///
/// An empty `country_id` matches no label and yields the fallbacks. The
/// returned location has no coordinates or postal code.
pub fn merge_places(country_id: &str, city_id: Option<&str>, labels: &LabelStore) -> GeoRecord {
    let country_en = labels.get(country_id, Locale::En);
    let country_ar = labels.get(country_id, Locale::Ar);
    // Arabic row first, then English
    let country = [country_ar, country_en];

    let city = |locale| city_id.and_then(|id| labels.get(id, locale));

    GeoRecord {
        country: CountryInfo {
            id: country_id.to_string(),
            iso_code: first(&country, |l| l.country_iso_code.as_deref(), UNKNOWN_ISO_CODE),
            en: first(&[country_en], |l| l.country_name.as_deref(), UNKNOWN_EN),
            ar: first(&[country_ar], |l| l.country_name.as_deref(), UNKNOWN_AR),
        },
        city: CityInfo {
            id: city_id.unwrap_or_default().to_string(),
            en: first(&[city(Locale::En)], |l| l.city_name.as_deref(), UNKNOWN_EN),
            ar: first(&[city(Locale::Ar)], |l| l.city_name.as_deref(), UNKNOWN_AR),
        },
        continent: ContinentInfo {
            code: first(&country, |l| l.continent_code.as_deref(), UNKNOWN_CONTINENT_CODE),
            en: first(&[country_en], |l| l.continent_name.as_deref(), UNKNOWN_EN),
            ar: first(&[country_ar], |l| l.continent_name.as_deref(), UNKNOWN_AR),
        },
        location: LocationInfo {
            latitude: None,
            longitude: None,
            postal_code: None,
            time_zone: first(&country, |l| l.time_zone.as_deref(), UNKNOWN_TIME_ZONE),
        },
    }
}

/// First non-blank field among the labels, in order
fn first<F>(labels: &[Option<&PlaceLabel>], field: F, fallback: &str) -> String
where
    F: Fn(&PlaceLabel) -> Option<&str>,
{
    labels
        .iter()
        .copied()
        .flatten()
        .find_map(field)
        .unwrap_or(fallback)
        .to_string()
}
