/// Small shared time helpers
///
/// Every persisted timestamp in this crate is UTC ISO-8601 with second
/// precision ("2025-08-25T10:00:00Z"), written and parsed through these two
/// functions so the export and index formats never drift apart.
use chrono::{DateTime, Utc};

/// Format a timestamp the way the export and index files store it
pub(crate) fn iso_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse a stored timestamp; accepts any RFC 3339 form including the
/// fractional-second variants other tools may have written
pub(crate) fn parse_iso_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Wall-clock milliseconds since the Unix epoch, the unit all the
/// debounce windows count in
pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
