//! Error types for text ranges, edits and diffing.

use thiserror::Error;

use crate::range::TextRange;

/// Result type for text operations.
pub type Result<T> = std::result::Result<T, TextError>;

/// Errors raised while resolving ranges, applying edits or diffing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TextError {
    #[error("Range {range} is out of bounds for text of {len} chars")]
    RangeOutOfBounds { range: TextRange, len: usize },

    #[error("Edits overlap: {first} and {second}")]
    OverlappingEdits { first: TextRange, second: TextRange },

    #[error("Position {line}:{character} is out of bounds")]
    InvalidPosition { line: usize, character: usize },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Diff oracle failed: {0}")]
    Oracle(String),
}

impl TextError {
    /// Check if this error is retryable.
    ///
    /// Only oracle failures are transient; malformed ranges stay malformed.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TextError::Oracle(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_is_retryable() {
        assert!(TextError::Oracle("busy".into()).is_retryable());
    }

    #[test]
    fn test_range_error_not_retryable() {
        let err = TextError::RangeOutOfBounds {
            range: TextRange::new(3, 9),
            len: 4,
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Range [3:9] is out of bounds for text of 4 chars"
        );
    }
}
