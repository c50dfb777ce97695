//! # Storage Backend Trait

use std::fmt;

use serde::Serialize;

use super::errors::StorageResult;
use crate::dataset::{Dataset, VersionStamp};

/// Which physical backend is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageKind {
    #[serde(rename = "json-file")]
    JsonFile,
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "sqlite")]
    Sqlite,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::JsonFile => "json-file",
            StorageKind::Postgres => "postgres",
            StorageKind::Sqlite => "sqlite",
        }
    }

    pub fn is_relational(&self) -> bool {
        !matches!(self, StorageKind::JsonFile)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical storage for the one shared document and its snapshot history.
///
/// Every implementation normalizes identically, report the same error
/// variants and derive tokens with the same contract, so nothing above this
/// trait branches on the backend type.
///
/// Methods block; async callers move them onto the blocking pool.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> StorageKind;

    /// Read the current document, bootstrapping it (existing state, then
    /// seed, then empty) and recording a bootstrap snapshot when nothing
    /// usable is stored yet.
    fn load_current(&self) -> StorageResult<Dataset>;

    /// Replace the current document and append a snapshot of it.
    fn persist(&self, dataset: &Dataset) -> StorageResult<()>;

    /// Token for the current durable state, or the initial stamp when no
    /// state exists.
    fn current_version(&self) -> StorageResult<VersionStamp>;

    /// Most recent snapshot, normalized. `StorageError::NotFound` when the
    /// history is empty.
    fn latest_snapshot(&self) -> StorageResult<Dataset>;

    /// Number of snapshots in the history.
    fn snapshot_count(&self) -> StorageResult<u64>;
}
