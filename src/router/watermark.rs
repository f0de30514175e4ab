//! Timestamps reported by probe rows

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::protocol::Column;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a watermark value.
///
/// Accepts RFC 3339 strings, zone-less `YYYY-MM-DD HH:MM:SS[.fff]` strings
/// (taken as UTC) and integer milliseconds since the epoch.
pub fn parse_watermark(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Watermark carried in the first column of a probe row.
pub fn row_watermark(columns: &[Column]) -> Option<DateTime<Utc>> {
    columns.first().and_then(|column| parse_watermark(&column.value))
}
