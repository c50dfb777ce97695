//! # Storage Errors

use std::io;

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Backend failures, identical across backends
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Nothing durable exists for the request (e.g. no snapshot yet)
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// Durable content exists but cannot be decoded
    #[error("Corrupt document: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Backend cannot be constructed from the given settings
    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// I/O failure with the operation and path that failed.
    pub fn io(context: impl AsRef<str>, err: io::Error) -> Self {
        StorageError::Io(format!("{}: {}", context.as_ref(), err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<::postgres::Error> for StorageError {
    fn from(err: ::postgres::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::Pool(err.to_string())
    }
}
