use thiserror::Error;

use super::StoreError;

/// Error type for service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The submitted URL is not an absolute http(s) URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Unrecoverable internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Store error with the failed operation attached
    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    pub fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }

    /// Returns the underlying store error, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}
