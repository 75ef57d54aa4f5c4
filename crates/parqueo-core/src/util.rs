//! Small text and clock helpers shared by the models, config, and remote
//! store modules.

use std::cmp::Ordering;

/// Trimmed text, or `None` when absent or blank
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}

pub fn is_http_url(value: &str) -> bool {
    let value = value.trim_start();
    value.starts_with("http://") || value.starts_with("https://")
}

/// Wall clock in Unix milliseconds; used in object names and lock stamps
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Order unit labels so `"2"` sorts before `"10"`. Non-numeric labels
/// compare case-insensitively.
pub fn numeric_aware_cmp(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<u64>(), right.trim().parse::<u64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left
            .to_lowercase()
            .cmp(&right.to_lowercase())
            .then_with(|| left.cmp(right)),
    }
}
