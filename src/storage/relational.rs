//! # Relational Backend
//!
//! SQL storage behind a connection pool built once at startup. The engine
//! is chosen by the URL scheme:
//!
//! - `postgres://`, `postgresql://` -> `PostgresBackend`
//! - `sqlite:`, `sqlite://` or a bare path -> `SqliteBackend`
//!
//! Both engines keep the same two tables (`app_state`, `app_state_snapshots`)
//! and derive the version token as `<updated_at_ms>-<revision>`. The
//! revision makes the token change even when two commits land in the same
//! clock tick.

use std::path::PathBuf;
use std::sync::Arc;

use super::backend::{StorageBackend, StorageKind};
use super::errors::{StorageError, StorageResult};
use super::postgres::PostgresBackend;
use super::sqlite::SqliteBackend;
use crate::dataset::{Dataset, SnapshotSource, TabSchema, VersionStamp};
use crate::observability::MetricsRegistry;

/// Logical key of the single current-state row.
pub const STATE_KEY: &str = "main";

/// Pool and transport settings shared by both engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub pool_size: u32,

    /// Verify the server certificate and hostname (Postgres only)
    pub verify_tls: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            pool_size: 4,
            verify_tls: true,
        }
    }
}

/// Engine named by a database URL. Unknown schemes are a config error.
pub fn relational_kind(url: &str) -> StorageResult<StorageKind> {
    let trimmed = url.trim();
    if trimmed.starts_with("postgres://") || trimmed.starts_with("postgresql://") {
        return Ok(StorageKind::Postgres);
    }
    match trimmed.split_once("://") {
        Some(("sqlite", _)) | None => Ok(StorageKind::Sqlite),
        Some((scheme, _)) => Err(StorageError::Config(format!(
            "unsupported database scheme '{}'",
            scheme
        ))),
    }
}

#[derive(Debug)]
pub enum RelationalBackend {
    Postgres(PostgresBackend),
    Sqlite(SqliteBackend),
}

impl RelationalBackend {
    /// Open the engine named by `url` and ensure its tables exist.
    ///
    /// Blocks; async callers run it on the blocking pool.
    pub fn open(
        url: &str,
        options: &ConnectOptions,
        seed_file: Option<PathBuf>,
        schema: TabSchema,
        metrics: Arc<MetricsRegistry>,
    ) -> StorageResult<Self> {
        match relational_kind(url)? {
            StorageKind::Postgres => Ok(Self::Postgres(PostgresBackend::open(
                url, options, seed_file, schema, metrics,
            )?)),
            _ => Ok(Self::Sqlite(SqliteBackend::open(
                url,
                options.pool_size,
                seed_file,
                schema,
                metrics,
            )?)),
        }
    }

    /// Install `dataset` as the current state and record a snapshot tagged
    /// with `source`, atomically.
    pub fn import(&self, dataset: &Dataset, source: SnapshotSource) -> StorageResult<()> {
        match self {
            Self::Postgres(engine) => engine.import(dataset, source),
            Self::Sqlite(engine) => engine.import(dataset, source),
        }
    }

    fn engine(&self) -> &dyn StorageBackend {
        match self {
            Self::Postgres(engine) => engine as &dyn StorageBackend,
            Self::Sqlite(engine) => engine as &dyn StorageBackend,
        }
    }
}

impl StorageBackend for RelationalBackend {
    fn kind(&self) -> StorageKind {
        self.engine().kind()
    }

    fn load_current(&self) -> StorageResult<Dataset> {
        self.engine().load_current()
    }

    fn persist(&self, dataset: &Dataset) -> StorageResult<()> {
        self.engine().persist(dataset)
    }

    fn current_version(&self) -> StorageResult<VersionStamp> {
        self.engine().current_version()
    }

    fn latest_snapshot(&self) -> StorageResult<Dataset> {
        self.engine().latest_snapshot()
    }

    fn snapshot_count(&self) -> StorageResult<u64> {
        self.engine().snapshot_count()
    }
}
