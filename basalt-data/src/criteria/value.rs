//! Scalar values carried by criteria leaves and field maps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scalar comparison value.
///
/// Criteria leaves, filter values, and partial-record fields all carry this
/// type, so a single tree-walk can merge and wrap them uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// UTF-8 text.
    String(String),
    /// Signed integer.
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// Boolean flag.
    Boolean(bool),
    /// UUID, used for ids and audit principal references.
    Uuid(Uuid),
    /// UTC timestamp, used for audit columns.
    DateTime(DateTime<Utc>),
    /// SQL NULL / absent value.
    Null,
}

impl Value {
    /// Truthiness used when folding list filters into a query: empty strings,
    /// zero, `false`, and null are skipped so blank form fields never narrow
    /// the result set.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::String(s) => !s.is_empty(),
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Boolean(b) => *b,
            Value::Uuid(_) | Value::DateTime(_) => true,
            Value::Null => false,
        }
    }

    /// Whether this is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The UUID payload, if this value is one.
    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(id) => Some(*id),
            _ => None,
        }
    }

    /// The timestamp payload, if this value is one.
    #[must_use]
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(at) => Some(*at),
            _ => None,
        }
    }

    /// The string payload, if this value is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Uuid(id) => write!(f, "{id}"),
            Value::DateTime(at) => write!(f, "{}", at.to_rfc3339()),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_skips_blank_values() {
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn truthiness_keeps_real_values() {
        assert!(Value::String("active".into()).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Uuid(Uuid::new_v4()).is_truthy());
        assert!(Value::DateTime(Utc::now()).is_truthy());
    }

    #[test]
    fn from_option_maps_none_to_null() {
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
        assert_eq!(Value::from(Some(7_i64)), Value::Integer(7));
    }

    #[test]
    fn display_renders_scalars() {
        assert_eq!(Value::String("a".into()).to_string(), "a");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
