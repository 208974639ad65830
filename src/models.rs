//! Defines the core data structures used in the place-scout application.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp format used for the `Date` column of the persisted store.
pub(crate) const DATE_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Column labels of the persisted store, in write order.
pub(crate) const STORE_COLUMNS: [&str; 10] = [
    "Input",
    "Name",
    "Address",
    "Phone",
    "Website",
    "Email",
    "Latitude",
    "Longitude",
    "Status",
    "Date",
];

/// Reconciliation outcome annotated on a stored record.
///
/// The store carries these as free-text labels; anything unrecognized
/// parses to `Unset` so a hand-edited sheet never breaks a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum RecordStatus {
    /// First time this record was seen.
    New,
    /// Flagged: an incoming record partially matched this row, it may be stale.
    ChangeCandidateOld,
    /// Flagged: this row partially matched an existing one, it may be current.
    ChangeCandidateNew,
    /// A typed search no longer returns this record.
    Inactive,
    /// No annotation.
    #[default]
    Unset,
}

impl RecordStatus {
    pub(crate) fn as_label(&self) -> &'static str {
        match self {
            RecordStatus::New => "New",
            RecordStatus::ChangeCandidateOld => "Check: possibly stale",
            RecordStatus::ChangeCandidateNew => "Check: possibly current",
            RecordStatus::Inactive => "Inactive",
            RecordStatus::Unset => "",
        }
    }

    pub(crate) fn from_label(label: &str) -> Self {
        match label.trim() {
            "New" => RecordStatus::New,
            "Check: possibly stale" => RecordStatus::ChangeCandidateOld,
            "Check: possibly current" => RecordStatus::ChangeCandidateNew,
            "Inactive" => RecordStatus::Inactive,
            _ => RecordStatus::Unset,
        }
    }
}

/// One business entity, one row of the persisted store.
///
/// All scraped fields are optional: the places service may omit any of
/// them and the record is still retained.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Record {
    /// Tag identifying the search that produced this record; the
    /// partition key for reconciliation scope.
    pub input_context: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: RecordStatus,
    /// Timestamp of the last reconciliation touch, [`DATE_FORMAT`].
    pub last_seen: String,
}

impl Record {
    /// The 5-field normalized signature used for identity and partial
    /// matching: (name, address, phone, website, email).
    pub(crate) fn comparison_tuple(&self) -> [String; 5] {
        [
            normalize_field(self.name.as_deref()),
            normalize_field(self.address.as_deref()),
            normalize_field(self.phone.as_deref()),
            normalize_field(self.website.as_deref()),
            normalize_field(self.email.as_deref()),
        ]
    }

    /// Serializes into a store row following [`STORE_COLUMNS`] order.
    pub(crate) fn to_row(&self) -> Vec<String> {
        let cell = |v: &Option<String>| v.clone().unwrap_or_default();
        let num = |v: &Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();
        vec![
            self.input_context.clone(),
            cell(&self.name),
            cell(&self.address),
            cell(&self.phone),
            cell(&self.website),
            cell(&self.email),
            num(&self.latitude),
            num(&self.longitude),
            self.status.as_label().to_string(),
            self.last_seen.clone(),
        ]
    }

    /// Deserializes a store row. Short rows are padded with empty cells;
    /// unparsable coordinates become `None`.
    pub(crate) fn from_row(row: &[String]) -> Self {
        let cell = |i: usize| -> Option<String> {
            row.get(i)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };
        let num = |i: usize| -> Option<f64> { cell(i).and_then(|s| s.parse().ok()) };
        Record {
            input_context: cell(0).unwrap_or_default(),
            name: cell(1),
            address: cell(2),
            phone: cell(3),
            website: cell(4),
            email: cell(5),
            latitude: num(6),
            longitude: num(7),
            status: RecordStatus::from_label(&cell(8).unwrap_or_default()),
            last_seen: cell(9).unwrap_or_default(),
        }
    }
}

/// Normalizes one comparison field to the canonical form used for
/// identity testing: null, blank, and the literal null-markers that a
/// round trip through the store can introduce all collapse to "".
pub(crate) fn normalize_field(value: Option<&str>) -> String {
    match value {
        None => String::new(),
        Some(raw) => {
            let trimmed = raw.trim();
            match trimmed {
                "" | "None" | "none" | "null" | "nan" | "NaN" => String::new(),
                other => other.to_string(),
            }
        }
    }
}

/// Search mode selected by the user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub(crate) enum SearchMode {
    /// Free-text search: category plus a typed place name.
    Typed { place: String },
    /// Location-biased search around a map-selected center.
    Map {
        latitude: f64,
        longitude: f64,
        radius_m: u32,
    },
}

/// Explicit per-run search context: the category, the mode, and the
/// derived `input_context` tag that scopes reconciliation. Passed to
/// every component instead of living in ambient session state.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SearchContext {
    pub category: String,
    pub mode: SearchMode,
    pub input_context: String,
}

impl SearchContext {
    pub(crate) fn typed(category: &str, place: &str) -> Self {
        SearchContext {
            category: category.to_string(),
            mode: SearchMode::Typed {
                place: place.to_string(),
            },
            input_context: format!("Typed: {} in {}", category, place),
        }
    }

    pub(crate) fn map(category: &str, latitude: f64, longitude: f64, radius_m: u32) -> Self {
        SearchContext {
            category: category.to_string(),
            mode: SearchMode::Map {
                latitude,
                longitude,
                radius_m,
            },
            input_context: format!(
                "Map: {} in {:.5}, {:.5} (radius {} m)",
                category, latitude, longitude, radius_m
            ),
        }
    }

    pub(crate) fn is_typed(&self) -> bool {
        matches!(self.mode, SearchMode::Typed { .. })
    }

    /// Scope prefix for map searches: every map search of the same
    /// category is in scope together, regardless of center and radius.
    pub(crate) fn map_scope_prefix(&self) -> String {
        format!("map: {}", self.category.to_lowercase())
    }
}

/// Formats a timestamp into the store's `Date` representation.
pub(crate) fn format_timestamp(now: DateTime<Local>) -> String {
    now.format(DATE_FORMAT).to_string()
}

/// One entry of a places search response page.
#[derive(Debug, Clone)]
pub(crate) struct PlaceSummary {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub location: Option<(f64, f64)>,
}

/// A single page of places search results plus its pagination cursor.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlacesPage {
    pub results: Vec<PlaceSummary>,
    pub next_page_token: Option<String>,
}

/// Detail fields fetched per place identifier. Any field may be absent.
#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct PlaceDetails {
    pub name: Option<String>,
    pub formatted_address: Option<String>,
    pub formatted_phone_number: Option<String>,
    pub website: Option<String>,
}
