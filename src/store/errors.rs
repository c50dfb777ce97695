//! # Store Errors

use thiserror::Error;

use crate::dataset::{DatasetError, VersionToken};
use crate::storage::StorageError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures callers of the state store can observe
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Malformed payload or empty required field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A mutation arrived without a version token
    #[error("A version token is required to modify the dataset")]
    PreconditionMissing,

    /// The supplied token is stale. Re-fetch and resubmit.
    #[error("Version conflict: current version is {current}")]
    VersionConflict { current: VersionToken },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend I/O failure or rolled-back transaction
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl StoreError {
    /// Conflicts are safe to retry after re-reading the dataset.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => StoreError::NotFound(what),
            other => StoreError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<DatasetError> for StoreError {
    fn from(err: DatasetError) -> Self {
        StoreError::InvalidInput(err.to_string())
    }
}
