//! Timestamp storage format.
//!
//! Every timestamp column holds fixed-width RFC 3339 UTC text with
//! microsecond precision, so comparing the strings in SQL orders them
//! chronologically.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Current time at storage precision. Values handed back to callers must
/// round-trip exactly, or a watermark set to a message's `created_at`
/// would not cover that message.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn to_sql(ts: DateTime<Utc>) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

pub fn from_sql(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    raw.parse::<DateTime<Utc>>().or_else(|_| {
        // Rows written by SQLite's datetime('now') have no zone or fraction.
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}
