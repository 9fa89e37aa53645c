//! Merged geo record and its MMDB data layout
//!
//! A [`GeoRecord`] is what every tree leaf points at. Text fields are never
//! empty: a missing label is replaced by one of the fallback constants
//! below before the record is built.
//!
//! Stored layout (GeoIP2 City compatible):
//!
//! ```text
//! { city:      { geoname_id, names: { en, ar } },
//!   continent: { code, names: { en, ar } },
//!   country:   { geoname_id, iso_code, names: { en, ar } },
//!   location:  { latitude?, longitude?, time_zone },
//!   postal:    { code }? }
//! ```

use crate::data_section::DataValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// English fallback text
pub const UNKNOWN_EN: &str = "Unknown";
/// Arabic fallback text
pub const UNKNOWN_AR: &str = "غير معروف";
/// Fallback ISO 3166 country code
pub const UNKNOWN_ISO_CODE: &str = "ZZ";
/// Fallback continent code
pub const UNKNOWN_CONTINENT_CODE: &str = "XX";
/// Fallback IANA time zone
pub const UNKNOWN_TIME_ZONE: &str = "Unknown";

/// Country part of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryInfo {
    /// Country place identifier (may be empty for fallback records)
    pub id: String,
    /// ISO 3166-1 alpha-2 code
    pub iso_code: String,
    /// English name
    pub en: String,
    /// Arabic name
    pub ar: String,
}

/// City part of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityInfo {
    /// City place identifier (empty when the block had none)
    pub id: String,
    /// English name
    pub en: String,
    /// Arabic name
    pub ar: String,
}

/// Continent part of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinentInfo {
    /// Two-letter continent code
    pub code: String,
    /// English name
    pub en: String,
    /// Arabic name
    pub ar: String,
}

/// Location part of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationInfo {
    /// Latitude, absent when the block had none
    pub latitude: Option<f64>,
    /// Longitude, absent when the block had none
    pub longitude: Option<f64>,
    /// Postal code, absent when the block had none
    pub postal_code: Option<String>,
    /// IANA time zone or the fallback
    pub time_zone: String,
}

/// One merged network record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoRecord {
    /// Country
    pub country: CountryInfo,
    /// City
    pub city: CityInfo,
    /// Continent
    pub continent: ContinentInfo,
    /// Coordinates, postal code, time zone
    pub location: LocationInfo,
}

impl GeoRecord {
    /// The record returned when nothing matches
    pub fn fallback() -> Self {
        Self {
            country: CountryInfo {
                id: String::new(),
                iso_code: UNKNOWN_ISO_CODE.to_string(),
                en: UNKNOWN_EN.to_string(),
                ar: UNKNOWN_AR.to_string(),
            },
            city: CityInfo {
                id: String::new(),
                en: UNKNOWN_EN.to_string(),
                ar: UNKNOWN_AR.to_string(),
            },
            continent: ContinentInfo {
                code: UNKNOWN_CONTINENT_CODE.to_string(),
                en: UNKNOWN_EN.to_string(),
                ar: UNKNOWN_AR.to_string(),
            },
            location: LocationInfo {
                latitude: None,
                longitude: None,
                postal_code: None,
                time_zone: UNKNOWN_TIME_ZONE.to_string(),
            },
        }
    }

    /// Encode into the stored map layout
    pub fn to_data_value(&self) -> DataValue {
        let mut country = BTreeMap::new();
        country.insert("geoname_id".to_string(), string(&self.country.id));
        country.insert("iso_code".to_string(), string(&self.country.iso_code));
        country.insert("names".to_string(), names(&self.country.en, &self.country.ar));

        let mut city = BTreeMap::new();
        city.insert("geoname_id".to_string(), string(&self.city.id));
        city.insert("names".to_string(), names(&self.city.en, &self.city.ar));

        let mut continent = BTreeMap::new();
        continent.insert("code".to_string(), string(&self.continent.code));
        continent.insert("names".to_string(), names(&self.continent.en, &self.continent.ar));

        let mut location = BTreeMap::new();
        if let Some(lat) = self.location.latitude {
            location.insert("latitude".to_string(), DataValue::Double(lat));
        }
        if let Some(lon) = self.location.longitude {
            location.insert("longitude".to_string(), DataValue::Double(lon));
        }
        location.insert("time_zone".to_string(), string(&self.location.time_zone));

        let mut root = BTreeMap::new();
        root.insert("city".to_string(), DataValue::Map(city));
        root.insert("continent".to_string(), DataValue::Map(continent));
        root.insert("country".to_string(), DataValue::Map(country));
        root.insert("location".to_string(), DataValue::Map(location));
        if let Some(code) = &self.location.postal_code {
            let mut postal = BTreeMap::new();
            postal.insert("code".to_string(), string(code));
            root.insert("postal".to_string(), DataValue::Map(postal));
        }
        DataValue::Map(root)
    }

    /// Decode from the stored layout; missing fields take fallback values
    pub fn from_data_value(value: &DataValue) -> Option<Self> {
        value.as_map()?;
        let text = |path: &[&str], fallback: &str| {
            value
                .get_path(path)
                .and_then(DataValue::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        let id = |path: &[&str]| {
            value
                .get_path(path)
                .and_then(DataValue::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Some(Self {
            country: CountryInfo {
                id: id(&["country", "geoname_id"]),
                iso_code: text(&["country", "iso_code"], UNKNOWN_ISO_CODE),
                en: text(&["country", "names", "en"], UNKNOWN_EN),
                ar: text(&["country", "names", "ar"], UNKNOWN_AR),
            },
            city: CityInfo {
                id: id(&["city", "geoname_id"]),
                en: text(&["city", "names", "en"], UNKNOWN_EN),
                ar: text(&["city", "names", "ar"], UNKNOWN_AR),
            },
            continent: ContinentInfo {
                code: text(&["continent", "code"], UNKNOWN_CONTINENT_CODE),
                en: text(&["continent", "names", "en"], UNKNOWN_EN),
                ar: text(&["continent", "names", "ar"], UNKNOWN_AR),
            },
            location: LocationInfo {
                latitude: value.get_path(&["location", "latitude"]).and_then(DataValue::as_f64),
                longitude: value.get_path(&["location", "longitude"]).and_then(DataValue::as_f64),
                postal_code: value
                    .get_path(&["postal", "code"])
                    .and_then(DataValue::as_str)
                    .map(str::to_string),
                time_zone: text(&["location", "time_zone"], UNKNOWN_TIME_ZONE),
            },
        })
    }
}

fn string(s: &str) -> DataValue {
    DataValue::String(s.to_string())
}

fn names(en: &str, ar: &str) -> DataValue {
    let mut map = BTreeMap::new();
    map.insert("en".to_string(), string(en));
    map.insert("ar".to_string(), string(ar));
    DataValue::Map(map)
}
