// ABOUTME: Canonical in-memory value model shared by every dialect
// ABOUTME: Normalizes raw driver output (byte buffers, binary UUIDs) before comparison and writes

mod compare;

pub use compare::{parse_timestamp, values_equal};

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// A single column value after it has left the driver.
///
/// Every dialect adapter converts its native result values into this enum so
/// the sync engine can compare and re-insert rows without knowing where they
/// came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => i64::try_from(*n).ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            Value::UInt(n) => Some(*n != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "y" | "yes" => Some(true),
                "f" | "false" | "0" | "n" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Render the value as text, the way it would appear in a text-protocol result.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::UInt(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::TimestampTz(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Json(v) => Some(v.to_string()),
        }
    }

    /// JSON form used for conflict snapshots and canonical primary keys.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::UInt(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Value::Json(v) => v.clone(),
            other => other
                .to_text()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }

    /// Inverse of [`Value::to_json`] for the scalar cases.
    ///
    /// Arrays and objects come back as `Value::Json`; timestamps come back as
    /// text, which the target driver coerces to the column type on write.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Json(other.clone()),
        }
    }
}

/// A result row: column names in driver order plus their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Case-insensitive lookup, used for catalog results whose column casing
    /// depends on the server.
    pub fn get_ignore_case(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn text(&self, idx: usize) -> Option<String> {
        self.values.get(idx).and_then(Value::to_text)
    }

    /// Run every value through [`normalize`].
    pub fn normalized(self) -> Self {
        Self {
            columns: self.columns,
            values: self.values.into_iter().map(normalize).collect(),
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Convert a raw driver value into its canonical form.
///
/// * Byte buffers holding valid UTF-8 become text.
/// * A 16-byte buffer that is not valid UTF-8 is read as a big-endian binary UUID.
/// * Any other byte buffer is hex encoded.
/// * Everything else, including text already shaped like a UUID, is unchanged.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(err) => {
                let bytes = err.into_bytes();
                match binary_to_uuid(&bytes) {
                    Some(uuid) => Value::Text(uuid),
                    None => Value::Text(hex::encode(&bytes)),
                }
            }
        },
        other => other,
    }
}

/// Decode bytes the driver reported as character data.
///
/// Invalid sequences are replaced with U+FFFD, except that a 16-byte buffer
/// goes through the binary UUID path instead.
pub fn decode_text_bytes(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => Value::Text(text),
        Err(err) => {
            let bytes = err.into_bytes();
            match binary_to_uuid(&bytes) {
                Some(uuid) => Value::Text(uuid),
                None => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
            }
        }
    }
}

/// Format a 16-byte big-endian UUID as `8-4-4-4-12` lowercase hex.
///
/// Returns `None` unless the input is exactly 16 bytes.
pub fn binary_to_uuid(bytes: &[u8]) -> Option<String> {
    let raw: [u8; 16] = bytes.try_into().ok()?;
    Some(uuid::Uuid::from_bytes(raw).hyphenated().to_string())
}

/// True when `text` is `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` with hex digits only.
pub fn is_canonical_uuid(text: &str) -> bool {
    if text.len() != 36 {
        return false;
    }
    text.bytes().enumerate().all(|(idx, b)| match idx {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}
