//! Typed record values
//!
//! Raw JSON values are decoded once, at the warehouse boundary, against the
//! declared [`FieldType`] so aggregation code only ever sees known types.

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::schema::FieldType;

/// A decoded record value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Text
    String(String),
    /// Numeric value
    Number(f64),
    /// Boolean
    Boolean(bool),
    /// Timestamp
    Date(DateTime<Utc>),
}

impl Value {
    /// Decode a raw JSON value against a declared type
    ///
    /// Returns `None` for `null` and for values that cannot be represented
    /// as the declared type; callers treat both as an absent field.
    pub fn decode(raw: &serde_json::Value, field_type: FieldType) -> Option<Self> {
        use serde_json::Value as J;

        match (field_type, raw) {
            (_, J::Null) => None,
            (FieldType::String, J::String(s)) => Some(Self::String(s.clone())),
            (FieldType::String, J::Number(n)) => Some(Self::String(n.to_string())),
            (FieldType::String, J::Bool(b)) => Some(Self::String(b.to_string())),
            (FieldType::Number, J::Number(n)) => n.as_f64().map(Self::Number),
            (FieldType::Number, J::String(s)) => s.trim().parse::<f64>().ok().map(Self::Number),
            (FieldType::Boolean, J::Bool(b)) => Some(Self::Boolean(*b)),
            (FieldType::Boolean, J::String(s)) => parse_bool(s).map(Self::Boolean),
            (FieldType::Date, J::String(s)) => parse_timestamp(s).map(Self::Date),
            (FieldType::Date, J::Number(n)) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(Self::Date),
            _ => None,
        }
    }

    /// Decode a value whose field is not declared in the schema, by its JSON shape
    pub fn infer(raw: &serde_json::Value) -> Option<Self> {
        use serde_json::Value as J;

        match raw {
            J::String(s) => Some(Self::String(s.clone())),
            J::Number(n) => n.as_f64().map(Self::Number),
            J::Bool(b) => Some(Self::Boolean(*b)),
            _ => None,
        }
    }

    /// Numeric projection used by aggregations
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    /// String contents, for string values only
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean contents, for boolean values only
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Timestamp contents, for date values only
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// An empty string counts as blank, like an absent field
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::String(s) if s.is_empty())
    }

    /// Canonical text used for distinct-value counting and grouping
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

/// Parse `true`/`false` (case-insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC)
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_date_only(s).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|t| t.and_utc())
}

/// Parse a bare `YYYY-MM-DD` calendar date
pub fn parse_date_only(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}
