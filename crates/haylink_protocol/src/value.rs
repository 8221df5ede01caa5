//! Dynamic remote value type.

use crate::entity_ref::EntityRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamic value as reported by the remote server.
///
/// Temporal values are carried as their textual form; the connector never
/// does arithmetic on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "val", rename_all = "camelCase")]
pub enum Value {
    /// Absent value.
    Null,
    /// Marker tag (presence only).
    Marker,
    /// Boolean value.
    Bool(bool),
    /// Number with an optional unit.
    Number {
        /// Numeric value.
        value: f64,
        /// Unit symbol, e.g. `°F` or `kW`.
        unit: Option<String>,
    },
    /// Text string.
    Str(String),
    /// Reference to another entity, with an optional display name.
    Ref {
        /// Target entity.
        id: EntityRef,
        /// Display name of the target.
        dis: Option<String>,
    },
    /// URI.
    Uri(String),
    /// ISO-8601 date.
    Date(String),
    /// ISO-8601 time of day.
    Time(String),
    /// ISO-8601 timestamp with zone.
    DateTime(String),
    /// Geographic coordinate.
    Coord {
        /// Latitude in decimal degrees.
        lat: f64,
        /// Longitude in decimal degrees.
        lng: f64,
    },
    /// Binary payload, known only by its MIME type.
    Bin {
        /// MIME type.
        mime: String,
    },
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested dictionary of named values.
    Dict(Vec<(String, Value)>),
}

impl Value {
    /// Creates a unitless number.
    pub fn number(value: f64) -> Self {
        Value::Number { value, unit: None }
    }

    /// Creates a number with a unit.
    pub fn number_with_unit(value: f64, unit: impl Into<String>) -> Self {
        Value::Number {
            value,
            unit: Some(unit.into()),
        }
    }

    /// Creates a ref value without display text.
    pub fn reference(id: impl Into<EntityRef>) -> Self {
        Value::Ref {
            id: id.into(),
            dis: None,
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string content for `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the ref for `Ref`.
    pub fn as_ref_id(&self) -> Option<&EntityRef> {
        match self {
            Value::Ref { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Returns the numeric value for `Number`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Marker => f.write_str("\u{2713}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number { value, unit } => match unit {
                Some(unit) => write!(f, "{value}{unit}"),
                None => write!(f, "{value}"),
            },
            Value::Str(s) | Value::Uri(s) | Value::Date(s) | Value::Time(s) | Value::DateTime(s) => {
                f.write_str(s)
            }
            Value::Ref { id, dis } => match dis {
                Some(dis) => write!(f, "{id} {dis:?}"),
                None => write!(f, "{id}"),
            },
            Value::Coord { lat, lng } => write!(f, "C({lat},{lng})"),
            Value::Bin { mime } => write!(f, "Bin({mime:?})"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (name, val)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{name}:{val}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<EntityRef> for Value {
    fn from(id: EntityRef) -> Self {
        Value::Ref { id, dis: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::from(21.5).as_number(), Some(21.5));
        assert_eq!(
            Value::reference("p1").as_ref_id(),
            Some(&EntityRef::new("p1"))
        );
        assert_eq!(Value::Marker.as_str(), None);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::number_with_unit(72.0, "°F").to_string(), "72°F");
        assert_eq!(Value::reference("p1").to_string(), "@p1");
        assert_eq!(
            Value::List(vec![Value::Bool(true), Value::number(2.0)]).to_string(),
            "[true, 2]"
        );
    }

    #[test]
    fn serde_tagging() {
        let json = serde_json::to_string(&Value::number_with_unit(1.5, "kW")).unwrap();
        assert!(json.contains("\"kind\":\"number\""));
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::number_with_unit(1.5, "kW"));
    }
}
