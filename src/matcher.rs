//! Decides whether a search result's address plausibly belongs to the
//! requested place name. Defends typed searches against the upstream
//! service returning same-named businesses in other cities.

use deunicode::deunicode;
use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]+").unwrap());

/// True iff the normalized place name appears in the normalized address,
/// either as a whole alphabetic token or immediately followed by a comma.
pub(crate) fn address_matches_place(address: &str, place: &str) -> bool {
    if address.is_empty() || place.is_empty() {
        return false;
    }

    let address_norm = deunicode(&address.to_lowercase());
    let place_norm = deunicode(&place.to_lowercase());

    let tokens: Vec<&str> = WORD_RE
        .find_iter(&address_norm)
        .map(|m| m.as_str())
        .collect();

    tokens.iter().any(|t| *t == place_norm)
        || address_norm.contains(&format!("{},", place_norm))
}
