//! Remote entity identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, globally unique remote identifier.
///
/// Refs compare by their bare id. A leading `@` (the textual ref marker) is
/// accepted on input and added back by `Display`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef(String);

impl EntityRef {
    /// Parses a ref, accepting an optional leading `@`.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let id = text.trim();
        let id = id.strip_prefix('@').unwrap_or(id);
        if id.is_empty() {
            return Err(ProtocolError::EmptyRef);
        }
        Ok(Self(id.to_string()))
    }

    /// Creates a ref from a bare id.
    ///
    /// Prefer [`EntityRef::parse`] for user input.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the bare id (without `@`).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<&str> for EntityRef {
    fn from(id: &str) -> Self {
        Self::new(id.strip_prefix('@').unwrap_or(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_marker() {
        let a = EntityRef::parse("@site-1").unwrap();
        let b = EntityRef::parse("site-1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "site-1");
        assert_eq!(a.to_string(), "@site-1");
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(EntityRef::parse(""), Err(ProtocolError::EmptyRef));
        assert_eq!(EntityRef::parse("@"), Err(ProtocolError::EmptyRef));
    }
}
