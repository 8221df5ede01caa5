//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or validating protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An entity reference was empty.
    #[error("entity ref must not be empty")]
    EmptyRef,

    /// A point-write level outside `1..=17`.
    #[error("invalid level {0}: must be between 1 and 17")]
    InvalidLevel(String),

    /// A value kind other than `bool`, `number` or `str`.
    #[error("unknown value type: {0}")]
    UnknownValueKind(String),

    /// A duration unit outside the supported set.
    #[error("unknown duration unit: {0}")]
    UnknownDurationUnit(String),

    /// A literal that could not be parsed as the requested kind.
    #[error("cannot parse {literal:?} as {kind}")]
    InvalidLiteral {
        /// The literal text.
        literal: String,
        /// The expected kind.
        kind: &'static str,
    },
}

impl ProtocolError {
    /// Create an invalid literal error.
    pub fn invalid_literal(literal: impl Into<String>, kind: &'static str) -> Self {
        Self::InvalidLiteral {
            literal: literal.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::InvalidLevel("18".into());
        assert_eq!(err.to_string(), "invalid level 18: must be between 1 and 17");

        let err = ProtocolError::invalid_literal("abc", "number");
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("number"));
    }
}
