//! Storage subsystem for tabvault
//!
//! Holds the one shared document and its snapshot history. Every backend
//! implements the same `StorageBackend` contract:
//!
//! - `FileBackend`: a JSON file plus a backups directory
//! - `RelationalBackend`: Postgres or embedded SQLite behind a pool
//!
//! The backend is chosen once at startup by `open_backend`: relational when
//! a database URL is configured, file otherwise. The URL scheme picks the
//! SQL engine.

mod backend;
mod errors;
mod fallback;
mod file;
mod postgres;
mod relational;
mod sqlite;

pub use backend::{StorageBackend, StorageKind};
pub use errors::{StorageError, StorageResult};
pub use fallback::{bootstrap_document, BootstrapOrigin};
pub use file::{FileBackend, BACKUPS_DIR_NAME, DATA_FILE_NAME, LATEST_BACKUP_NAME};
pub use postgres::PostgresBackend;
pub use relational::{relational_kind, ConnectOptions, RelationalBackend, STATE_KEY};
pub use sqlite::{database_path, SqliteBackend};

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::TabSchema;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `db.json` and `backups/` in file mode
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// First-boot seed document. Defaults to `<data_dir>/seed.json`.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// Selects the relational backend when present
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Verify the Postgres server certificate and hostname
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_pool_size() -> u32 {
    4
}

fn default_verify_tls() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            seed_file: None,
            database_url: None,
            pool_size: default_pool_size(),
            verify_tls: default_verify_tls(),
        }
    }
}

impl StorageConfig {
    /// File-mode config rooted at `data_dir`
    pub fn file(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn seed_path(&self) -> PathBuf {
        self.seed_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("seed.json"))
    }

    /// The configured database URL, ignoring blank values.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Backend this config selects. An unrecognised URL scheme reports
    /// SQLite here and is rejected by `open_backend`.
    pub fn kind(&self) -> StorageKind {
        match self.database_url() {
            Some(url) => relational_kind(url).unwrap_or(StorageKind::Sqlite),
            None => StorageKind::JsonFile,
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            pool_size: self.pool_size,
            verify_tls: self.verify_tls,
        }
    }
}

/// Construct the backend selected by `config`.
///
/// Relational engines connect eagerly, so async callers run this on the
/// blocking pool.
pub fn open_backend(
    config: &StorageConfig,
    schema: TabSchema,
    metrics: Arc<MetricsRegistry>,
) -> StorageResult<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.database_url() {
        Some(url) => Arc::new(RelationalBackend::open(
            url,
            &config.connect_options(),
            Some(config.seed_path()),
            schema,
            metrics,
        )?),
        None => Arc::new(FileBackend::new(
            &config.data_dir,
            Some(config.seed_path()),
            schema,
            metrics,
        )),
    };

    log_event_with_fields(Event::StorageSelected, &[("storage", backend.kind().as_str())]);
    Ok(backend)
}
