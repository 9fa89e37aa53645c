//! Address resolution and response shaping
//!
//! [`resolve`] never fails: bad input, missing matches and broken indexes
//! all come back as a serializable [`Resolution`].

use crate::database::GeoDatabase;
use crate::record::GeoRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::net::IpAddr;

/// Error text for addresses that are not IP literals
pub const INVALID_IP_MESSAGE: &str = "Invalid IP address";

/// Outcome of resolving one address
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolution {
    /// The address parsed; the response may still carry an `error`
    Resolved(GeoResponse),
    /// The input was not an IP address
    Invalid {
        /// Always [`INVALID_IP_MESSAGE`]
        error: String,
    },
}

impl Resolution {
    /// The response body, if the address was valid
    pub fn response(&self) -> Option<&GeoResponse> {
        match self {
            Resolution::Resolved(response) => Some(response),
            Resolution::Invalid { .. } => None,
        }
    }
}

/// Country as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryView {
    /// ISO 3166 code, `ZZ` when unknown
    pub iso_code: String,
    /// English name
    pub en: String,
    /// Arabic name
    pub ar: String,
}

/// Continent as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinentView {
    /// Two-letter code, `XX` when unknown
    pub code: String,
    /// English name
    pub en: String,
    /// Arabic name
    pub ar: String,
}

/// City as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityView {
    /// English name
    pub en: String,
    /// Arabic name
    pub ar: String,
}

/// Location as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationView {
    /// Latitude of the block, if known
    pub latitude: Option<f64>,
    /// Longitude of the block, if known
    pub longitude: Option<f64>,
    /// Postal code of the block, if known
    pub postal_code: Option<String>,
    /// IANA time zone of the country, `Unknown` when absent
    pub time_zone: String,
}

/// Enriched lookup response
///
/// The geo sections are absent only when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoResponse {
    /// Address as given
    pub ip: String,
    /// `IPv4` or `IPv6`
    pub ip_version: &'static str,
    /// Response time, RFC 3339 UTC
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<CountryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continent: Option<ContinentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<CityView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationView>,
    /// Map link when both coordinates are non-zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    /// Lookup failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeoResponse {
    fn empty(ip: &str, version: &'static str, now: DateTime<Utc>) -> Self {
        Self {
            ip: ip.to_string(),
            ip_version: version,
            generated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            country: None,
            continent: None,
            city: None,
            location: None,
            map: None,
            error: None,
        }
    }

    fn fill(&mut self, record: GeoRecord) {
        self.map = map_link(record.location.latitude, record.location.longitude);
        self.country = Some(CountryView {
            iso_code: record.country.iso_code,
            en: record.country.en,
            ar: record.country.ar,
        });
        self.continent = Some(ContinentView {
            code: record.continent.code,
            en: record.continent.en,
            ar: record.continent.ar,
        });
        self.city = Some(CityView {
            en: record.city.en,
            ar: record.city.ar,
        });
        self.location = Some(LocationView {
            latitude: record.location.latitude,
            longitude: record.location.longitude,
            postal_code: record.location.postal_code,
            time_zone: record.location.time_zone,
        });
    }
}

/// Response for the caller's own address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MyIp {
    /// The address the caller is seen as
    pub ip: String,
}

/// `IPv4`/`IPv6` for a parsed address
pub fn ip_version(addr: &IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => "IPv4",
        IpAddr::V6(_) => "IPv6",
    }
}

/// Map link for a coordinate pair; zero or missing coordinates give none
pub fn map_link(latitude: Option<f64>, longitude: Option<f64>) -> Option<String> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => {
            Some(format!("https://www.google.com/maps/@{},{},15z", lat, lon))
        }
        _ => None,
    }
}

/// Resolve an address against the served index
///
/// `db` is `None` when no index has been loaded; that case, like any lookup
/// failure, is reported in the `error` field.
pub fn resolve(address: &str, db: Option<&GeoDatabase>) -> Resolution {
    resolve_at(address, db, Utc::now())
}

/// [`resolve`] with a fixed clock
pub fn resolve_at(address: &str, db: Option<&GeoDatabase>, now: DateTime<Utc>) -> Resolution {
    let Ok(addr) = address.parse::<IpAddr>() else {
        return Resolution::Invalid {
            error: INVALID_IP_MESSAGE.to_string(),
        };
    };
    let mut response = GeoResponse::empty(address, ip_version(&addr), now);

    let Some(db) = db else {
        response.error = Some("no index loaded".to_string());
        return Resolution::Resolved(response);
    };

    let found = match addr {
        IpAddr::V4(v4) => db.lookup(v4),
        IpAddr::V6(_) => Ok(None),
    };
    match found {
        Ok(record) => response.fill(record.unwrap_or_else(GeoRecord::fallback)),
        Err(e) => response.error = Some(e.to_string()),
    }
    Resolution::Resolved(response)
}

/// Pick the forwarded address when the proxy supplied one
pub fn resolve_my_ip(forwarded: Option<&str>, peer: &str) -> MyIp {
    let ip = forwarded
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(peer);
    MyIp { ip: ip.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_builder::GeoIndexBuilder;
    use crate::record::{UNKNOWN_AR, UNKNOWN_CONTINENT_CODE, UNKNOWN_EN, UNKNOWN_ISO_CODE};

    fn db() -> GeoDatabase {
        let mut record = GeoRecord::fallback();
        record.country.iso_code = "JO".to_string();
        record.country.en = "Jordan".to_string();
        record.country.ar = "الأردن".to_string();
        record.location.latitude = Some(31.9552);
        record.location.longitude = Some(35.945);

        let mut no_coords = record.clone();
        no_coords.location.latitude = Some(0.0);

        let mut builder = GeoIndexBuilder::new();
        builder.insert(&"46.185.128.0/17".parse().unwrap(), &record).unwrap();
        builder.insert(&"46.185.0.0/24".parse().unwrap(), &no_coords).unwrap();
        GeoDatabase::from_bytes(builder.serialize().unwrap()).unwrap()
    }

    #[test]
    fn test_invalid_address() {
        let db = db();
        for bad in ["not-an-ip", "", "256.1.1.1", "1.2.3.4:80"] {
            assert_eq!(
                resolve(bad, Some(&db)),
                Resolution::Invalid {
                    error: INVALID_IP_MESSAGE.to_string()
                }
            );
        }
    }

    #[test]
    fn test_found_record() {
        let db = db();
        let resolution = resolve("46.185.200.1", Some(&db));
        let response = resolution.response().unwrap();
        assert_eq!(response.ip_version, "IPv4");
        assert_eq!(response.country.as_ref().unwrap().ar, "الأردن");
        assert_eq!(
            response.map.as_deref(),
            Some("https://www.google.com/maps/@31.9552,35.945,15z")
        );
        assert!(response.error.is_none());
    }

    #[test]
    fn test_zero_coordinate_has_no_map() {
        let db = db();
        let resolution = resolve("46.185.0.7", Some(&db));
        let response = resolution.response().unwrap();
        assert_eq!(response.country.as_ref().unwrap().iso_code, "JO");
        assert!(response.map.is_none());
    }

    #[test]
    fn test_not_found_is_fallback() {
        let db = db();
        for addr in ["8.8.8.8", "2001:4860:4860::8888"] {
            let resolution = resolve(addr, Some(&db));
            let response = resolution.response().unwrap();
            assert!(response.error.is_none());
            let country = response.country.as_ref().unwrap();
            assert_eq!(country.iso_code, UNKNOWN_ISO_CODE);
            assert_eq!(country.en, UNKNOWN_EN);
            assert_eq!(country.ar, UNKNOWN_AR);
            assert_eq!(response.continent.as_ref().unwrap().code, UNKNOWN_CONTINENT_CODE);
            assert!(response.map.is_none());
        }
        let v6 = resolve("::1", Some(&db));
        assert_eq!(v6.response().unwrap().ip_version, "IPv6");
    }

    #[test]
    fn test_missing_index_sets_error() {
        let resolution = resolve("1.1.1.1", None);
        let response = resolution.response().unwrap();
        assert_eq!(response.ip, "1.1.1.1");
        assert!(response.error.is_some());
        assert!(response.country.is_none());
    }

    #[test]
    fn test_json_shape() {
        let db = db();
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_value(resolve_at("46.185.200.1", Some(&db), now)).unwrap();
        assert_eq!(json["generatedAt"], "2024-05-01T12:00:00.000Z");
        assert_eq!(json["country"]["en"], "Jordan");
        assert_eq!(json["location"]["time_zone"], "Unknown");
        assert!(json.get("error").is_none());

        let invalid = serde_json::to_value(resolve("nope", Some(&db))).unwrap();
        assert_eq!(invalid, serde_json::json!({"error": "Invalid IP address"}));
    }

    #[test]
    fn test_map_link() {
        assert!(map_link(Some(1.5), None).is_none());
        assert!(map_link(Some(0.0), Some(3.0)).is_none());
        assert_eq!(
            map_link(Some(-33.494), Some(143.2104)).as_deref(),
            Some("https://www.google.com/maps/@-33.494,143.2104,15z")
        );
    }

    #[test]
    fn test_my_ip_prefers_forwarded() {
        assert_eq!(resolve_my_ip(Some("203.0.113.9"), "10.0.0.1").ip, "203.0.113.9");
        assert_eq!(resolve_my_ip(Some("  "), "10.0.0.1").ip, "10.0.0.1");
        assert_eq!(resolve_my_ip(None, "10.0.0.1").ip, "10.0.0.1");
    }
}
