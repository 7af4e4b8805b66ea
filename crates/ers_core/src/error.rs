//! Error types for the entity-relationship storage.
//!
//! Engine-native errors (SQLite, key-value engines, I/O) are translated
//! into [`ErsError`] at the backend boundary, so callers never match on
//! engine-specific types.

use crate::types::EntityId;
use ers_codec::CodecError;
use ers_kv::KvError;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type ErsResult<T> = Result<T, ErsError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum ErsError {
    /// A write transaction could not commit because of contention.
    ///
    /// This is the only error [`crate::EntityRelationshipStorage::transactional_optimistic`]
    /// retries.
    #[error("transaction conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// A caller-asserted invariant did not hold.
    #[error("consistency violation: {message}")]
    ConsistencyViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// The backend does not implement the requested operation.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// The operation that was requested.
        operation: String,
    },

    /// The transaction was already committed or aborted.
    #[error("transaction is finished")]
    TransactionFinished,

    /// The entity does not exist or was deleted.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The storage is immutable.
    #[error("storage is immutable")]
    Immutable,

    /// A mutation was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The storage was closed.
    #[error("storage is closed")]
    Closed,

    /// Another process holds the storage directory.
    #[error("storage locked: another process has exclusive access")]
    StorageLocked,

    /// No backend is registered under this id.
    #[error("unknown backend: {id}")]
    UnknownBackend {
        /// Requested backend id.
        id: String,
    },

    /// Settings do not fit the selected backend.
    #[error("invalid settings: {message}")]
    InvalidSettings {
        /// Description of the problem.
        message: String,
    },

    /// A dump file is malformed or corrupted.
    #[error("invalid dump: {message}")]
    InvalidDump {
        /// Description of the problem.
        message: String,
    },

    /// An engine error that has no more specific translation.
    #[error("{backend} backend error: {message}")]
    Backend {
        /// Backend id.
        backend: &'static str,
        /// Engine error message.
        message: String,
    },

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ErsError {
    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a consistency violation error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates an invalid settings error.
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }

    /// Creates an invalid dump error.
    pub fn invalid_dump(message: impl Into<String>) -> Self {
        Self::InvalidDump {
            message: message.into(),
        }
    }

    /// Wraps an engine error message.
    pub fn backend(backend: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Backend {
            backend,
            message: error.to_string(),
        }
    }

    /// Whether retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<KvError> for ErsError {
    fn from(error: KvError) -> Self {
        match error {
            KvError::Conflict { message } => Self::Conflict { message },
            KvError::TransactionFinished | KvError::CursorClosed => Self::TransactionFinished,
            KvError::ReadOnly => Self::ReadOnly,
            KvError::Io(e) => Self::Io(e),
            KvError::UnknownEngine { id } => {
                Self::invalid_settings(format!("unknown key-value engine: {id}"))
            }
            KvError::MissingLocation { engine } => {
                Self::invalid_settings(format!("engine {engine} requires a storage location"))
            }
            other => Self::backend("kv", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_conflict_stays_a_conflict() {
        let error: ErsError = KvError::conflict("busy").into();
        assert!(error.is_conflict());
    }

    #[test]
    fn kv_engine_errors_are_wrapped() {
        let error: ErsError = KvError::engine("lmdb", "map full").into();
        assert!(matches!(error, ErsError::Backend { backend: "kv", .. }));
        assert!(error.to_string().contains("map full"));
    }
}
