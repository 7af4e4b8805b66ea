//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The compressed encoding only accepts non-negative integers.
    #[error("compressed encoding rejects negative value {value}")]
    NegativeCompressed {
        /// The rejected value.
        value: i64,
    },

    /// The byte sequence has the wrong length for the requested type.
    #[error("invalid length for {type_name}: expected {expected}, got {actual}")]
    InvalidLength {
        /// Name of the decoded type.
        type_name: &'static str,
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        actual: usize,
    },

    /// Failed to decode bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Integer overflow during decoding.
    #[error("integer overflow")]
    IntegerOverflow,
}

impl CodecError {
    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_length(type_name: &'static str, expected: usize, actual: usize) -> Self {
        Self::InvalidLength {
            type_name,
            expected,
            actual,
        }
    }
}
