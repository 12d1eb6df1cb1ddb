// ABOUTME: Value equality used by snapshot conflict detection
// ABOUTME: Timestamps compare by whole-second Unix epoch regardless of encoding

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::Value;

/// Naive layouts tried after RFC 3339. `%.f` also matches an absent fraction.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse text as a timestamp using the layouts drivers commonly emit.
///
/// Offset-bearing inputs are converted to UTC; naive inputs are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(text, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

fn as_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Text(text) => parse_timestamp(text),
        Value::Timestamp(ts) => Some(ts.and_utc()),
        Value::TimestampTz(ts) => Some(*ts),
        Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|ts| ts.and_utc()),
        _ => None,
    }
}

fn raw_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::UInt(y)) | (Value::UInt(y), Value::Int(x)) => {
            u64::try_from(*x).map(|x| x == *y).unwrap_or(false)
        }
        (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

/// Compare two normalized values.
///
/// Both null is equal and exactly one null is not. When both sides read as
/// timestamps they are equal if they land on the same Unix second; a
/// timestamp never equals a non-timestamp. Anything else is compared as-is.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }

    match (as_instant(a), as_instant(b)) {
        (Some(x), Some(y)) => x.timestamp() == y.timestamp(),
        (None, None) => raw_equal(a, b),
        _ => false,
    }
}
