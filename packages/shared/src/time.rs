//! Time-related utilities for rendering server timestamps.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Formats accepted for server-assigned `createdAt` values that carry no offset.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Get current Unix timestamp in UTC (milliseconds)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert Unix timestamp (milliseconds) to a `HH:MM:SS` wall clock (UTC)
pub fn millis_to_clock(timestamp_millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(timestamp_millis).map(|dt| dt.format("%H:%M:%S").to_string())
}

/// Parse a server-assigned timestamp.
///
/// Accepts RFC 3339 (with offset) as well as the offset-less local date-time
/// shape that JVM backends emit for `LocalDateTime`.
pub fn parse_server_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Render a server timestamp as `HH:MM:SS`, falling back to the raw text.
pub fn server_time_of_day(raw: &str) -> String {
    parse_server_datetime(raw)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| raw.to_string())
}
