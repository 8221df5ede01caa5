//! Local typed values held by tree nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a node's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Any value; used for null and untyped nodes.
    #[default]
    Dynamic,
    /// Boolean.
    Bool,
    /// Number.
    Number,
    /// String.
    String,
    /// Array of values.
    Array,
    /// Map of named values.
    Map,
}

impl ValueType {
    /// Lowercase name of the type.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Dynamic => "dynamic",
            ValueType::Bool => "bool",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Map => "map",
        }
    }
}

/// A value stored on a tree node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeValue {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
    /// Array of values.
    Array(Vec<NodeValue>),
    /// Map of named values.
    Map(BTreeMap<String, NodeValue>),
}

impl NodeValue {
    /// The type this value would declare.
    pub fn value_type(&self) -> ValueType {
        match self {
            NodeValue::Null => ValueType::Dynamic,
            NodeValue::Bool(_) => ValueType::Bool,
            NodeValue::Number(_) => ValueType::Number,
            NodeValue::String(_) => ValueType::String,
            NodeValue::Array(_) => ValueType::Array,
            NodeValue::Map(_) => ValueType::Map,
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, NodeValue::Null)
    }

    /// Returns the number, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            NodeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Null => f.write_str("null"),
            NodeValue::Bool(b) => write!(f, "{b}"),
            NodeValue::Number(n) => write!(f, "{n}"),
            NodeValue::String(s) => f.write_str(s),
            NodeValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            NodeValue::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for NodeValue {
    fn from(b: bool) -> Self {
        NodeValue::Bool(b)
    }
}

impl From<f64> for NodeValue {
    fn from(n: f64) -> Self {
        NodeValue::Number(n)
    }
}

impl From<&str> for NodeValue {
    fn from(s: &str) -> Self {
        NodeValue::String(s.to_string())
    }
}

impl From<String> for NodeValue {
    fn from(s: String) -> Self {
        NodeValue::String(s)
    }
}
