//! Combines places results, detail fetches and discovered emails into
//! the canonical [`Record`] shape consumed by the reconciliation engine.

use crate::emails::domain_of;
use crate::geo::haversine_m;
use crate::matcher::address_matches_place;
use crate::models::{
    PlaceDetails, PlaceSummary, Record, RecordStatus, SearchContext, SearchMode, format_timestamp,
};
use chrono::{DateTime, Local};
use std::collections::HashMap;

/// Enforces the circular search boundary: the grid fetch over-covers a
/// bounding square, so anything beyond the true radius is dropped.
pub(crate) fn filter_by_radius(
    summaries: Vec<PlaceSummary>,
    center: (f64, f64),
    radius_m: u32,
) -> Vec<PlaceSummary> {
    summaries
        .into_iter()
        .filter(|s| match s.location {
            Some(location) => haversine_m(center, location) <= radius_m as f64,
            None => false,
        })
        .collect()
}

/// Builds one record per surviving result, defaulting absent fields to
/// `None`. In typed mode, results whose address does not plausibly
/// belong to the requested place are discarded.
pub(crate) fn assemble_records(
    summaries: &[PlaceSummary],
    details: &HashMap<String, PlaceDetails>,
    context: &SearchContext,
    now: DateTime<Local>,
) -> Vec<Record> {
    let empty = PlaceDetails::default();
    let timestamp = format_timestamp(now);
    let mut records = Vec::new();

    for summary in summaries {
        let detail = summary
            .place_id
            .as_ref()
            .and_then(|id| details.get(id))
            .unwrap_or(&empty);

        if let SearchMode::Typed { place } = &context.mode {
            let address = detail.formatted_address.as_deref().unwrap_or("");
            if !address_matches_place(address, place) {
                tracing::debug!(
                    "Dropping result with non-matching address: {:?}",
                    detail.formatted_address
                );
                continue;
            }
        }

        records.push(Record {
            input_context: context.input_context.clone(),
            name: detail.name.clone().or_else(|| summary.name.clone()),
            address: detail.formatted_address.clone(),
            phone: detail.formatted_phone_number.clone(),
            website: detail.website.clone(),
            email: None,
            latitude: summary.location.map(|l| l.0),
            longitude: summary.location.map(|l| l.1),
            status: RecordStatus::New,
            last_seen: timestamp.clone(),
        });
    }

    records
}

/// Unique website URLs of the batch, in first-seen order, for the email
/// discovery phase.
pub(crate) fn collect_websites(records: &[Record]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .filter_map(|r| r.website.clone())
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Applies the domain-keyed email map back onto the batch; domains the
/// discovery phase never resolved stay `None`.
pub(crate) fn apply_emails(records: &mut [Record], emails: &HashMap<String, Option<String>>) {
    for record in records.iter_mut() {
        record.email = record
            .website
            .as_deref()
            .and_then(domain_of)
            .and_then(|domain| emails.get(&domain).cloned())
            .flatten();
    }
}
