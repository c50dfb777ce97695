//! # SQLite Engine
//!
//! Embedded relational storage for single-host deployments, selected by a
//! `sqlite:` URL or a bare path.
//!
//! Same two tables as the Postgres engine:
//!
//! - `app_state`: one row per logical key holding the current document,
//!   a revision counter bumped on every write and the commit time in ms.
//! - `app_state_snapshots`: append-only history (`bootstrap`, `put`,
//!   `migration`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::Value;

use super::backend::{StorageBackend, StorageKind};
use super::errors::{StorageError, StorageResult};
use super::fallback::bootstrap_document;
use super::relational::STATE_KEY;
use crate::dataset::{Dataset, SnapshotSource, TabSchema, VersionStamp, VersionToken};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS app_state (
    id          TEXT PRIMARY KEY,
    payload     TEXT NOT NULL,
    revision    INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS app_state_snapshots (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at  INTEGER NOT NULL,
    source      TEXT NOT NULL,
    payload     TEXT NOT NULL
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type SqlitePool = Pool<SqliteConnectionManager>;

#[derive(Debug)]
pub struct SqliteBackend {
    pool: SqlitePool,
    seed_file: Option<PathBuf>,
    schema: TabSchema,
    metrics: Arc<MetricsRegistry>,
}

impl SqliteBackend {
    /// Open (creating if needed) the database named by `url` and ensure the
    /// tables exist.
    pub fn open(
        url: &str,
        pool_size: u32,
        seed_file: Option<PathBuf>,
        schema: TabSchema,
        metrics: Arc<MetricsRegistry>,
    ) -> StorageResult<Self> {
        let path = database_path(url)?;
        Self::open_path(&path, pool_size, seed_file, schema, metrics)
    }

    pub fn open_path(
        path: &Path,
        pool_size: u32,
        seed_file: Option<PathBuf>,
        schema: TabSchema,
        metrics: Arc<MetricsRegistry>,
    ) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::io(format!("create {}", parent.display()), e))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        pool.get()?.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            pool,
            seed_file,
            schema,
            metrics,
        })
    }

    /// Install `dataset` as the current state and record a snapshot tagged
    /// with `source`, atomically.
    pub fn import(&self, dataset: &Dataset, source: SnapshotSource) -> StorageResult<()> {
        let payload = serde_json::to_string(dataset)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_state(&tx, &payload, source)?;
        // Dropping an uncommitted transaction rolls it back.
        tx.commit()?;
        self.metrics.increment_snapshots();
        Ok(())
    }

    fn conn(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn decode(&self, payload: &str) -> StorageResult<Dataset> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let dataset = Dataset::from_value(value).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(self.schema.normalize(dataset))
    }
}

/// Append a snapshot and upsert the current row inside `tx`.
fn write_state(tx: &Transaction<'_>, payload: &str, source: SnapshotSource) -> StorageResult<()> {
    let now = Utc::now().timestamp_millis();
    tx.execute(
        "INSERT INTO app_state_snapshots (created_at, source, payload) VALUES (?1, ?2, ?3)",
        params![now, source.as_str(), payload],
    )?;
    tx.execute(
        "INSERT INTO app_state (id, payload, revision, updated_at) VALUES (?1, ?2, 1, ?3)
         ON CONFLICT(id) DO UPDATE SET
             payload = excluded.payload,
             revision = app_state.revision + 1,
             updated_at = excluded.updated_at",
        params![STATE_KEY, payload, now],
    )?;
    Ok(())
}

impl StorageBackend for SqliteBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Sqlite
    }

    fn load_current(&self) -> StorageResult<Dataset> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT payload FROM app_state WHERE id = ?1",
                params![STATE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(payload) = existing {
            return self.decode(&payload);
        }

        let (dataset, origin) = bootstrap_document(&self.schema, self.seed_file.as_deref());
        let payload = serde_json::to_string(&dataset)?;
        write_state(&tx, &payload, SnapshotSource::Bootstrap)?;
        tx.commit()?;
        self.metrics.increment_snapshots();

        let origin = origin.to_string();
        log_event_with_fields(
            Event::StorageBootstrapped,
            &[
                ("origin", origin.as_str()),
                ("reason", "missing"),
                ("storage", StorageKind::Sqlite.as_str()),
            ],
        );
        Ok(dataset)
    }

    fn persist(&self, dataset: &Dataset) -> StorageResult<()> {
        self.import(dataset, SnapshotSource::Put)
    }

    fn current_version(&self) -> StorageResult<VersionStamp> {
        let conn = self.conn()?;
        let row: Option<(i64, i64)> = conn
            .query_row(
                "SELECT revision, updated_at FROM app_state WHERE id = ?1",
                params![STATE_KEY],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((revision, updated_at)) => VersionStamp {
                token: VersionToken::new(format!("{}-{}", updated_at, revision)),
                saved_at: DateTime::<Utc>::from_timestamp_millis(updated_at),
            },
            None => VersionStamp::initial(),
        })
    }

    fn latest_snapshot(&self) -> StorageResult<Dataset> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM app_state_snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(payload) => self.decode(&payload),
            None => Err(StorageError::NotFound("no backup snapshot exists".to_string())),
        }
    }

    fn snapshot_count(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM app_state_snapshots", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

/// Resolve a connection string to a database file path.
///
/// Accepts `sqlite://<path>`, `sqlite:<path>` or a bare path. In-memory
/// databases are rejected: every pooled connection would see its own copy.
pub fn database_path(url: &str) -> StorageResult<PathBuf> {
    let trimmed = url.trim();
    let path = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
        rest
    } else if let Some((scheme, _)) = trimmed.split_once("://") {
        return Err(StorageError::Config(format!(
            "unsupported database scheme '{}'",
            scheme
        )));
    } else {
        trimmed
    };

    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return Err(StorageError::Config(
            "database url must name a file".to_string(),
        ));
    }
    Ok(PathBuf::from(path))
}
