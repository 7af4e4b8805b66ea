//! SQLite error translation.

use super::SQL_BACKEND_ID;
use crate::error::ErsError;
use rusqlite::ErrorCode;

impl From<rusqlite::Error> for ErsError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            // Includes SQLITE_LOCKED_SHAREDCACHE, raised when an in-memory
            // database is shared between connections.
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                ErsError::conflict(format!(
                    "a parallel transaction holds a lock on a shared resource: {error}"
                ))
            }
            _ => ErsError::backend(SQL_BACKEND_ID, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn lock_errors_become_conflicts() {
        assert!(ErsError::from(failure(ffi::SQLITE_BUSY)).is_conflict());
        assert!(ErsError::from(failure(ffi::SQLITE_LOCKED)).is_conflict());
        assert!(ErsError::from(failure(ffi::SQLITE_LOCKED_SHAREDCACHE)).is_conflict());
    }

    #[test]
    fn other_errors_are_wrapped() {
        let error = ErsError::from(failure(ffi::SQLITE_CORRUPT));
        assert!(matches!(error, ErsError::Backend { backend: "sql", .. }));
        let error = ErsError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(!error.is_conflict());
    }
}
