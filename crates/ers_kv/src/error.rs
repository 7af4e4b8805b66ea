//! Error types for key-value operations.

use std::io;
use thiserror::Error;

/// Result type for key-value operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors that can occur during key-value operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write could not be applied because of contention.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// The transaction was already committed or aborted.
    #[error("transaction is finished")]
    TransactionFinished,

    /// A write was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The cursor was used after `close`.
    #[error("cursor is closed")]
    CursorClosed,

    /// The cursor is not positioned on an entry.
    #[error("cursor is not positioned on an entry")]
    CursorNotPositioned,

    /// A persistent engine was opened without a location.
    #[error("engine {engine} requires a storage location")]
    MissingLocation {
        /// Engine id.
        engine: &'static str,
    },

    /// The engine id is not known or not compiled in.
    #[error("unknown key-value engine: {id}")]
    UnknownEngine {
        /// Requested engine id.
        id: String,
    },

    /// An error reported by the underlying engine.
    #[error("{engine} error: {message}")]
    Engine {
        /// Engine id.
        engine: &'static str,
        /// Engine error message.
        message: String,
    },
}

impl KvError {
    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Wrap an engine-native error.
    pub fn engine(engine: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Engine {
            engine,
            message: error.to_string(),
        }
    }
}
