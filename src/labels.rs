//! Bilingual place-name store
//!
//! Loads the locations table once per rebuild and indexes it by
//! `(place_id, locale)`. Only English and Arabic rows are kept.

use crate::error::Result;
use crate::file_reader::{cell, column, csv_reader, optional_column, TableSource};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use std::fmt;
use std::io::Read;

const TABLE: &str = "labels";

/// One of the two supported label languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    /// English
    En,
    /// Arabic
    Ar,
}

impl Locale {
    /// Both locales, English first
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Ar];

    /// Parse a `locale_code` cell
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Locale::En),
            "ar" => Some(Locale::Ar),
            _ => None,
        }
    }

    /// Code used in tables and record `names` maps
    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ar => "ar",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Names and codes for one place in one locale
///
/// Blank cells are stored as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceLabel {
    /// Two-letter continent code
    pub continent_code: Option<String>,
    /// Continent name
    pub continent_name: Option<String>,
    /// ISO 3166-1 alpha-2 country code
    pub country_iso_code: Option<String>,
    /// Country name
    pub country_name: Option<String>,
    /// City name
    pub city_name: Option<String>,
    /// IANA time zone
    pub time_zone: Option<String>,
}

/// Row counts from the last load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelLoadStats {
    /// Rows read, header excluded
    pub rows: usize,
    /// Rows stored in the English map (replacements included)
    pub english: usize,
    /// Rows stored in the Arabic map (replacements included)
    pub arabic: usize,
    /// Rows without a place identifier
    pub missing_place_id: usize,
    /// Rows without a locale code
    pub missing_locale: usize,
    /// Rows in a locale other than en/ar
    pub other_locale: usize,
}

/// Immutable label maps for both locales
#[derive(Debug, Default)]
pub struct LabelStore {
    english: FxHashMap<String, PlaceLabel>,
    arabic: FxHashMap<String, PlaceLabel>,
    stats: LabelLoadStats,
}

struct LabelColumns {
    place_id: usize,
    locale: usize,
    continent_code: Option<usize>,
    continent_name: Option<usize>,
    country_iso_code: Option<usize>,
    country_name: Option<usize>,
    city_name: Option<usize>,
    time_zone: Option<usize>,
}

impl LabelStore {
    /// An empty store; every lookup falls back
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the locations table
    ///
    /// A missing `geoname_id` or `locale_code` header is fatal. Rows that
    /// lack either value are skipped and counted.
    pub fn load(source: &TableSource) -> Result<Self> {
        debug!("Loading labels from {}", source);
        let mut reader = csv_reader(source)?;
        let store = Self::from_csv(&mut reader)?;
        info!(
            "Loaded {} English and {} Arabic labels from {}",
            store.english.len(),
            store.arabic.len(),
            source
        );
        Ok(store)
    }

    /// Load from any CSV byte stream
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::from_csv(&mut reader)
    }

    fn from_csv<R: Read>(reader: &mut csv::Reader<R>) -> Result<Self> {
        let headers = reader.headers()?.clone();
        let cols = LabelColumns {
            place_id: column(&headers, TABLE, "geoname_id")?,
            locale: column(&headers, TABLE, "locale_code")?,
            continent_code: optional_column(&headers, "continent_code"),
            continent_name: optional_column(&headers, "continent_name"),
            country_iso_code: optional_column(&headers, "country_iso_code"),
            country_name: optional_column(&headers, "country_name"),
            city_name: optional_column(&headers, "city_name"),
            time_zone: optional_column(&headers, "time_zone"),
        };

        let mut store = Self::default();
        for row in reader.records() {
            let row = row?;
            store.stats.rows += 1;

            let Some(place_id) = cell(&row, Some(cols.place_id)) else {
                store.stats.missing_place_id += 1;
                continue;
            };
            let locale = match cell(&row, Some(cols.locale)) {
                None => {
                    store.stats.missing_locale += 1;
                    continue;
                }
                Some(code) => match Locale::from_code(code) {
                    Some(locale) => locale,
                    None => {
                        store.stats.other_locale += 1;
                        continue;
                    }
                },
            };

            let text = |index: Option<usize>| cell(&row, index).map(str::to_string);
            let label = PlaceLabel {
                continent_code: text(cols.continent_code),
                continent_name: text(cols.continent_name),
                country_iso_code: text(cols.country_iso_code),
                country_name: text(cols.country_name),
                city_name: text(cols.city_name),
                time_zone: text(cols.time_zone),
            };
            store.insert(place_id, locale, label);
        }

        if store.stats.missing_place_id > 0 || store.stats.missing_locale > 0 {
            warn!(
                "Skipped {} label rows without geoname_id and {} without locale_code",
                store.stats.missing_place_id, store.stats.missing_locale
            );
        }
        if store.stats.other_locale > 0 {
            debug!(
                "Skipped {} label rows in unsupported locales",
                store.stats.other_locale
            );
        }
        Ok(store)
    }

    /// Add or replace one label
    pub fn insert(&mut self, place_id: &str, locale: Locale, label: PlaceLabel) {
        match locale {
            Locale::En => {
                self.stats.english += 1;
                self.english.insert(place_id.to_string(), label);
            }
            Locale::Ar => {
                self.stats.arabic += 1;
                self.arabic.insert(place_id.to_string(), label);
            }
        }
    }

    /// Label for a place in one locale
    pub fn get(&self, place_id: &str, locale: Locale) -> Option<&PlaceLabel> {
        match locale {
            Locale::En => self.english.get(place_id),
            Locale::Ar => self.arabic.get(place_id),
        }
    }

    /// Distinct places known in a locale
    pub fn len(&self, locale: Locale) -> usize {
        match locale {
            Locale::En => self.english.len(),
            Locale::Ar => self.arabic.len(),
        }
    }

    /// True when neither locale has any label
    pub fn is_empty(&self) -> bool {
        self.english.is_empty() && self.arabic.is_empty()
    }

    /// Counts from the load that produced this store
    pub fn stats(&self) -> &LabelLoadStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "geoname_id,locale_code,continent_code,continent_name,country_iso_code,country_name,city_name,time_zone\n";

    fn store(rows: &str) -> LabelStore {
        LabelStore::from_reader(format!("{HEADER}{rows}").as_bytes()).unwrap()
    }

    #[test]
    fn test_partitions_by_locale() {
        let labels = store(
            "102358,en,AS,Asia,SA,Saudi Arabia,,Asia/Riyadh\n\
             102358,ar,AS,آسيا,SA,السعودية,,Asia/Riyadh\n",
        );
        let en = labels.get("102358", Locale::En).unwrap();
        assert_eq!(en.country_name.as_deref(), Some("Saudi Arabia"));
        assert_eq!(en.city_name, None);
        let ar = labels.get("102358", Locale::Ar).unwrap();
        assert_eq!(ar.country_name.as_deref(), Some("السعودية"));
        assert_eq!(ar.time_zone.as_deref(), Some("Asia/Riyadh"));
    }

    #[test]
    fn test_row_without_place_id_is_skipped() {
        let labels = store(
            ",en,EU,Europe,FR,France,Paris,\n\
             2988507,en,EU,Europe,FR,France,Paris,Europe/Paris\n",
        );
        assert_eq!(labels.len(Locale::En), 1);
        assert_eq!(labels.len(Locale::Ar), 0);
        assert_eq!(labels.stats().missing_place_id, 1);
        assert_eq!(labels.stats().rows, 2);
    }

    #[test]
    fn test_unsupported_and_missing_locales_are_counted() {
        let labels = store(
            "1,fr,EU,Europe,FR,France,,\n\
             2,,EU,Europe,FR,France,,\n\
             3,en,EU,Europe,FR,France,,\n",
        );
        assert_eq!(labels.stats().other_locale, 1);
        assert_eq!(labels.stats().missing_locale, 1);
        assert!(labels.get("1", Locale::En).is_none());
        assert!(labels.get("3", Locale::En).is_some());
    }

    #[test]
    fn test_later_row_replaces_earlier() {
        let labels = store(
            "5,en,AF,Africa,EG,Egypt,Old Cairo,\n\
             5,en,AF,Africa,EG,Egypt,Cairo,\n",
        );
        assert_eq!(labels.len(Locale::En), 1);
        assert_eq!(
            labels.get("5", Locale::En).unwrap().city_name.as_deref(),
            Some("Cairo")
        );
    }

    #[test]
    fn test_time_zone_column_is_optional() {
        let csv = "geoname_id,locale_code,country_name\n7,ar,الأردن\n";
        let labels = LabelStore::from_reader(csv.as_bytes()).unwrap();
        let label = labels.get("7", Locale::Ar).unwrap();
        assert_eq!(label.country_name.as_deref(), Some("الأردن"));
        assert_eq!(label.time_zone, None);
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let csv = "geoname_id,country_name\n1,France\n";
        let err = LabelStore::from_reader(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("locale_code"));
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let labels = store("9,en,EU\n");
        let label = labels.get("9", Locale::En).unwrap();
        assert_eq!(label.continent_code.as_deref(), Some("EU"));
        assert_eq!(label.country_name, None);
    }
}
