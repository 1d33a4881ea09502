use sqlx::Error as SqlxError;
use thiserror::Error;

use crate::models::UrlRecord;

/// Error type for URL store operations, shared by every backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the short key
    #[error("Short key not found: {0}")]
    NotFound(String),

    /// The record exists but was soft-deleted
    #[error("Short key has been deleted: {0}")]
    AlreadyDeleted(String),

    /// The original URL already has an active short key. Carries the existing record.
    #[error("URL already shortened as '{}'", .0.short_key)]
    AlreadyExists(Box<UrlRecord>),

    /// A freshly generated short key collides with an active record
    #[error("Short key already in use: {0}")]
    KeyConflict(String),

    /// The bulk copy wrote a different number of rows than submitted
    #[error("Bulk write count mismatch: expected {expected} rows, wrote {actual}")]
    CountMismatch { expected: u64, actual: u64 },

    /// The bulk write could not be carried out
    #[error("Bulk write failed: {0}")]
    BulkWriteFailed(String),

    /// A batch record clashes with stored data or with another record of the batch
    #[error("Batch conflicts with existing data: {0}")]
    BatchConflict(String),

    /// A batch operation received no items
    #[error("Empty batch: at least one item is required")]
    EmptyInput,

    /// The underlying file or database cannot be reached
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Persisted data could not be encoded or decoded
    #[error("Invalid stored data: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(SqlxError),

    /// One or more soft-delete batches failed. Holds every worker error.
    #[error("Soft delete failed: {}", .0.join("; "))]
    DeleteFailed(Vec<String>),
}

impl From<SqlxError> for StoreError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::PoolTimedOut
            | SqlxError::PoolClosed
            | SqlxError::WorkerCrashed
            | SqlxError::Io(_)
            | SqlxError::Tls(_) => Self::StorageUnavailable(err.to_string()),
            _ => Self::Database(err),
        }
    }
}

impl From<csv::Error> for StoreError {
    fn from(err: csv::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Returns true when the error is a PostgreSQL unique violation (`23505`).
pub fn is_unique_violation(err: &SqlxError) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_unavailable() {
        assert!(matches!(
            StoreError::from(SqlxError::PoolTimedOut),
            StoreError::StorageUnavailable(_)
        ));
        assert!(matches!(
            StoreError::from(SqlxError::PoolClosed),
            StoreError::StorageUnavailable(_)
        ));
        assert!(matches!(
            StoreError::from(SqlxError::RowNotFound),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn delete_failed_joins_messages() {
        let err = StoreError::DeleteFailed(vec!["batch 1".into(), "batch 3".into()]);
        assert_eq!(err.to_string(), "Soft delete failed: batch 1; batch 3");
    }
}
