//! Utility functions and helpers.

pub mod http;
pub mod retry;

use chrono::{DateTime, SecondsFormat, Utc};

/// Colour band for an AtCoder rating or difficulty.
pub fn rate_to_color(rate: i64) -> &'static str {
    const BANDS: &[&str] = &[
        "gray", "brown", "green", "cyan", "blue", "yellow", "orange", "red", "silver",
    ];
    if rate < 0 {
        return "black";
    }
    BANDS.get((rate / 400) as usize).copied().unwrap_or("gold")
}

/// Colour for an optional difficulty; unknown difficulty is black.
pub fn difficulty_color(difficulty: Option<i64>) -> &'static str {
    difficulty.map_or("black", rate_to_color)
}

/// Format a timestamp the way Solr date fields expect it.
pub fn solr_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format an epoch second as a Solr date; out-of-range values clamp to the epoch.
pub fn solr_datetime_from_epoch(epoch_second: i64) -> String {
    solr_datetime(DateTime::from_timestamp(epoch_second, 0).unwrap_or_default())
}
