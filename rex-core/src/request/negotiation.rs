//! Header lookups behind `req.is()` and the `req.accepts*()` family.
//!
//! Deliberately simple: entries with `q=0` are refused, everything else is
//! acceptable, and the first acceptable offer (in caller order) wins.

/// Resolve `json`, `.html` or `text/plain; charset=utf-8` to a lower-case essence
pub(crate) fn normalize_type(value: &str) -> Option<String> {
    let essence = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if essence.is_empty() {
        return None;
    }
    if essence.contains('/') {
        return Some(essence);
    }
    mime_guess::from_ext(essence.trim_start_matches('.')).first_raw().map(str::to_string)
}

/// `pattern` may be `*/*`, `type/*` or a full essence
pub(crate) fn mime_matches(actual: &str, pattern: &str) -> bool {
    if pattern == "*/*" || pattern == "*" {
        return true;
    }
    match (actual.split_once('/'), pattern.split_once('/')) {
        (Some((actual_type, actual_sub)), Some((pattern_type, pattern_sub))) => {
            (pattern_type == "*" || pattern_type == actual_type)
                && (pattern_sub == "*" || pattern_sub == actual_sub)
        }
        _ => false,
    }
}

/// Accept-style header entries with a non-zero quality, lower-cased
pub(crate) fn accepted_entries(header: &str) -> Vec<String> {
    header
        .split(',')
        .filter_map(|entry| {
            let mut pieces = entry.split(';');
            let value = pieces.next()?.trim().to_ascii_lowercase();
            if value.is_empty() {
                return None;
            }
            let refused = pieces.any(|param| {
                param
                    .trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });
            (!refused).then_some(value)
        })
        .collect()
}

/// First offered media type the `Accept` header allows
pub(crate) fn accepts_type(header: Option<&str>, offers: &[&str]) -> Option<String> {
    let Some(header) = header.filter(|h| !h.trim().is_empty()) else {
        return offers.first().map(|o| o.to_string());
    };
    let entries = accepted_entries(header);

    offers
        .iter()
        .find(|offer| {
            normalize_type(offer)
                .is_some_and(|offered| entries.iter().any(|entry| mime_matches(&offered, entry)))
        })
        .map(|offer| offer.to_string())
}

/// First offered token (charset, encoding, language) the header allows
pub(crate) fn accepts_token(
    header: Option<&str>,
    offers: &[&str],
    prefix_match: bool,
) -> Option<String> {
    let Some(header) = header.filter(|h| !h.trim().is_empty()) else {
        return offers.first().map(|o| o.to_string());
    };
    let entries = accepted_entries(header);

    offers
        .iter()
        .find(|offer| {
            let offer = offer.to_ascii_lowercase();
            entries.iter().any(|entry| {
                entry == "*"
                    || *entry == offer
                    || (prefix_match
                        && (offer.starts_with(&format!("{}-", entry))
                            || entry.starts_with(&format!("{}-", offer))))
            })
        })
        .map(|offer| offer.to_string())
}
