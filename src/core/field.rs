//! Field value types, data types and coercion

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A polymorphic field value that can hold different types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Map(IndexMap<String, FieldValue>),
    Null,
}

impl FieldValue {
    /// Build a string-keyed map value, preserving the given order
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        FieldValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a float, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get the value as a boolean if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as a map if possible
    pub fn as_map(&self) -> Option<&IndexMap<String, FieldValue>> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Compare two values of compatible kinds.
    ///
    /// Integers and floats compare numerically with each other. Null and
    /// mismatched kinds are incomparable.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Text rendering used for pattern matching and option keys
    pub fn to_text(&self) -> Option<String> {
        match self {
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
            FieldValue::DateTime(d) => Some(d.to_rfc3339()),
            FieldValue::Map(_) | FieldValue::Null => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Map(m) => write!(f, "{{{} entries}}", m.len()),
            other => write!(f, "{}", other.to_text().unwrap_or_default()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Storage data type of a column or custom field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    String,
    Memo,
    Int,
    Float,
    Money,
    Boolean,
    Date,
}

impl DataType {
    /// Parse the stored name of a data type
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "String" => Some(DataType::String),
            "Memo" => Some(DataType::Memo),
            "Int" => Some(DataType::Int),
            "Float" => Some(DataType::Float),
            "Money" => Some(DataType::Money),
            "Boolean" => Some(DataType::Boolean),
            "Date" => Some(DataType::Date),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "String",
            DataType::Memo => "Memo",
            DataType::Int => "Int",
            DataType::Float => "Float",
            DataType::Money => "Money",
            DataType::Boolean => "Boolean",
            DataType::Date => "Date",
        }
    }

    /// Coerce a value into the representation stored for this type.
    ///
    /// Null passes through unchanged. The error is a human-readable reason.
    pub fn coerce(&self, value: FieldValue) -> Result<FieldValue, String> {
        if value.is_null() {
            return Ok(value);
        }
        match (self, value) {
            (DataType::String | DataType::Memo, FieldValue::String(s)) => Ok(FieldValue::String(s)),
            (DataType::String | DataType::Memo, FieldValue::Integer(i)) => {
                Ok(FieldValue::String(i.to_string()))
            }
            (DataType::Int, FieldValue::Integer(i)) => Ok(FieldValue::Integer(i)),
            (DataType::Int, FieldValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("'{}' is not an integer", s)),
            (DataType::Float | DataType::Money, v @ (FieldValue::Float(_) | FieldValue::Integer(_))) => {
                Ok(FieldValue::Float(v.as_float().unwrap_or_default()))
            }
            (DataType::Float | DataType::Money, FieldValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| format!("'{}' is not a number", s)),
            (DataType::Boolean, FieldValue::Boolean(b)) => Ok(FieldValue::Boolean(b)),
            (DataType::Boolean, FieldValue::Integer(i)) if i == 0 || i == 1 => {
                Ok(FieldValue::Boolean(i == 1))
            }
            (DataType::Boolean, FieldValue::String(s)) => match s.as_str() {
                "1" | "true" => Ok(FieldValue::Boolean(true)),
                "0" | "false" => Ok(FieldValue::Boolean(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },
            (DataType::Date, FieldValue::DateTime(d)) => Ok(FieldValue::DateTime(d)),
            (DataType::Date, FieldValue::String(s)) => parse_date(&s)
                .map(FieldValue::DateTime)
                .ok_or_else(|| format!("'{}' is not a date", s)),
            (data_type, other) => Err(format!(
                "value {} cannot be stored as {}",
                other,
                data_type.as_str()
            )),
        }
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_string() {
        let value = FieldValue::from("test");
        assert_eq!(value.as_string(), Some("test"));
        assert_eq!(value.as_integer(), None);
        assert!(!value.is_null());
    }

    #[test]
    fn test_field_value_integer() {
        let value = FieldValue::Integer(42);
        assert_eq!(value.as_integer(), Some(42));
        assert_eq!(value.as_float(), Some(42.0));
        assert_eq!(value.as_string(), None);
    }

    #[test]
    fn test_field_value_null_from_none() {
        let value: FieldValue = Option::<&str>::None.into();
        assert!(value.is_null());
    }

    #[test]
    fn test_map_preserves_order() {
        let value = FieldValue::map([("r", "Red"), ("g", "Green"), ("b", "Blue")]);
        let keys: Vec<&str> = value
            .as_map()
            .unwrap()
            .keys()
            .map(|k| k.as_str())
            .collect();
        assert_eq!(keys, vec!["r", "g", "b"]);
    }

    #[test]
    fn test_compare_numeric_across_kinds() {
        assert_eq!(
            FieldValue::Integer(2).compare(&FieldValue::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(FieldValue::Null.compare(&FieldValue::Null), None);
        assert_eq!(FieldValue::from("a").compare(&FieldValue::Integer(1)), None);
    }

    #[test]
    fn test_display_quotes_strings() {
        assert_eq!(FieldValue::from("it's").to_string(), "'it''s'");
        assert_eq!(FieldValue::Null.to_string(), "NULL");
        assert_eq!(FieldValue::Integer(7).to_string(), "7");
    }

    #[test]
    fn test_coerce_int_from_string() {
        assert_eq!(
            DataType::Int.coerce(FieldValue::from(" 12 ")),
            Ok(FieldValue::Integer(12))
        );
        assert!(DataType::Int.coerce(FieldValue::from("twelve")).is_err());
    }

    #[test]
    fn test_coerce_boolean() {
        assert_eq!(
            DataType::Boolean.coerce(FieldValue::from("1")),
            Ok(FieldValue::Boolean(true))
        );
        assert_eq!(
            DataType::Boolean.coerce(FieldValue::Integer(0)),
            Ok(FieldValue::Boolean(false))
        );
        assert!(DataType::Boolean.coerce(FieldValue::Integer(3)).is_err());
    }

    #[test]
    fn test_coerce_date() {
        let coerced = DataType::Date.coerce(FieldValue::from("2024-03-01")).unwrap();
        assert!(matches!(coerced, FieldValue::DateTime(_)));
        assert!(DataType::Date.coerce(FieldValue::from("yesterday")).is_err());
    }

    #[test]
    fn test_coerce_null_passthrough() {
        assert_eq!(DataType::Int.coerce(FieldValue::Null), Ok(FieldValue::Null));
    }

    #[test]
    fn test_coerce_rejects_map() {
        let map = FieldValue::map([("a", "b")]);
        assert!(DataType::String.coerce(map).is_err());
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!(DataType::parse("Money"), Some(DataType::Money));
        assert_eq!(DataType::parse("money"), None);
        assert_eq!(DataType::Memo.as_str(), "Memo");
    }

    #[test]
    fn test_serde_roundtrip_map() {
        let original = FieldValue::map([("r", FieldValue::from("Red"))]);
        let json = serde_json::to_string(&original).expect("serialize should succeed");
        let restored: FieldValue =
            serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(original, restored);
    }
}
