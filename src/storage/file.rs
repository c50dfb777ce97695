//! # JSON File Backend
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/db.json                      current document
//! <data_dir>/db.json.tmp                  staging file for atomic replace
//! <data_dir>/backups/db-<stamp>.json      one snapshot per committed write
//! <data_dir>/backups/db-latest.json       copy of the newest snapshot
//! <data_dir>/backups/db-<stamp>.unusable.json
//!                                         unreadable document set aside
//!                                         before a bootstrap replaced it
//! ```
//!
//! The version token is the millisecond modification time of `db.json`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::backend::{StorageBackend, StorageKind};
use super::errors::{StorageError, StorageResult};
use super::fallback::bootstrap_document;
use crate::dataset::{Dataset, TabSchema, VersionStamp, VersionToken};
use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry};

pub const DATA_FILE_NAME: &str = "db.json";
pub const BACKUPS_DIR_NAME: &str = "backups";
pub const LATEST_BACKUP_NAME: &str = "db-latest.json";

const SNAPSHOT_PREFIX: &str = "db-";
const SNAPSHOT_SUFFIX: &str = ".json";
const UNUSABLE_SUFFIX: &str = ".unusable.json";

/// What is currently on disk
#[derive(Debug)]
enum DocumentState {
    Missing,
    /// Present but not a complete document; `bytes` is the raw content
    Unusable { reason: String, bytes: Vec<u8> },
    Ready(Dataset),
}

#[derive(Debug)]
pub struct FileBackend {
    data_file: PathBuf,
    temp_file: PathBuf,
    backups_dir: PathBuf,
    seed_file: Option<PathBuf>,
    schema: TabSchema,
    metrics: Arc<MetricsRegistry>,
}

impl FileBackend {
    pub fn new(
        data_dir: &Path,
        seed_file: Option<PathBuf>,
        schema: TabSchema,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let data_file = data_dir.join(DATA_FILE_NAME);
        Self {
            temp_file: data_dir.join(format!("{}.tmp", DATA_FILE_NAME)),
            backups_dir: data_dir.join(BACKUPS_DIR_NAME),
            data_file,
            seed_file,
            schema,
            metrics,
        }
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Read the current document without bootstrapping.
    ///
    /// Returns `None` when the file is absent or unusable. Used by the
    /// migration and summary utilities, which must not write file state.
    pub fn read_existing(&self) -> StorageResult<Option<Dataset>> {
        match self.read_document()? {
            DocumentState::Ready(dataset) => Ok(Some(dataset)),
            DocumentState::Missing | DocumentState::Unusable { .. } => Ok(None),
        }
    }

    fn read_document(&self) -> StorageResult<DocumentState> {
        let bytes = match fs::read(&self.data_file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DocumentState::Missing),
            Err(e) => {
                return Err(StorageError::io(
                    format!("read {}", self.data_file.display()),
                    e,
                ))
            }
        };

        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                return Ok(DocumentState::Unusable {
                    reason: e.to_string(),
                    bytes,
                })
            }
        };
        if !self.schema.is_complete(&value) {
            return Ok(DocumentState::Unusable {
                reason: "required tabs missing".to_string(),
                bytes,
            });
        }

        let dataset = Dataset::from_value(value).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(DocumentState::Ready(self.schema.normalize(dataset)))
    }

    /// Replace `db.json` with `bytes`: staged write plus rename, degrading
    /// to a direct write when the staged path fails.
    fn write_document(&self, bytes: &[u8]) -> StorageResult<()> {
        if let Some(parent) = self.data_file.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::io(format!("create {}", parent.display()), e))?;
        }

        let previous = modified_millis(&self.data_file)
            .map_err(|e| StorageError::io(format!("stat {}", self.data_file.display()), e))?;

        if let Err(e) = self.write_staged(bytes) {
            self.metrics.increment_atomic_rename_fallbacks();
            let reason = e.to_string();
            let path = self.data_file.display().to_string();
            log_event_with_fields(
                Event::AtomicRenameFallback,
                &[("path", path.as_str()), ("reason", reason.as_str())],
            );
            let _ = fs::remove_file(&self.temp_file);
            write_synced(&self.data_file, bytes)
                .map_err(|e| StorageError::io(format!("write {}", path), e))?;
        }

        self.ensure_mtime_advanced(previous)
    }

    fn write_staged(&self, bytes: &[u8]) -> io::Result<()> {
        write_synced(&self.temp_file, bytes)?;
        fs::rename(&self.temp_file, &self.data_file)
    }

    /// Consecutive writes must never share a token.
    fn ensure_mtime_advanced(&self, previous: Option<i64>) -> StorageResult<()> {
        match previous {
            Some(previous) => advance_mtime(&self.data_file, previous, set_mtime),
            None => Ok(()),
        }
    }

    /// Append a snapshot copy. Best-effort: failures are logged and counted,
    /// never returned.
    fn record_snapshot(&self, bytes: &[u8]) {
        match self.write_snapshot_files(bytes) {
            Ok(path) => {
                self.metrics.increment_snapshots();
                let path = path.display().to_string();
                Logger::trace("SNAPSHOT_WRITTEN", &[("path", path.as_str())]);
            }
            Err(e) => {
                self.metrics.increment_backup_copy_failures();
                let reason = e.to_string();
                let dir = self.backups_dir.display().to_string();
                log_event_with_fields(
                    Event::BackupCopyFailed,
                    &[("dir", dir.as_str()), ("reason", reason.as_str())],
                );
            }
        }
    }

    fn write_snapshot_files(&self, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.write_unique_backup(SNAPSHOT_SUFFIX, bytes)?;
        write_synced(&self.backups_dir.join(LATEST_BACKUP_NAME), bytes)?;
        Ok(path)
    }

    /// Set an unusable `db.json` aside before a bootstrap overwrites it.
    /// Best-effort like snapshots: the bootstrap goes ahead either way.
    fn preserve_unusable(&self, bytes: &[u8]) {
        match self.write_unique_backup(UNUSABLE_SUFFIX, bytes) {
            Ok(path) => {
                self.metrics.increment_unusable_documents_preserved();
                let path = path.display().to_string();
                log_event_with_fields(
                    Event::UnusableDocumentPreserved,
                    &[("path", path.as_str())],
                );
            }
            Err(e) => {
                self.metrics.increment_backup_copy_failures();
                let reason = e.to_string();
                let dir = self.backups_dir.display().to_string();
                log_event_with_fields(
                    Event::BackupCopyFailed,
                    &[("dir", dir.as_str()), ("reason", reason.as_str())],
                );
            }
        }
    }

    /// Write `bytes` to a fresh `db-<stamp><suffix>` in the backups
    /// directory, adding `-<n>` when the name is taken.
    fn write_unique_backup(&self, suffix: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.backups_dir)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}{}{}", SNAPSHOT_PREFIX, stamp, suffix)
            } else {
                format!("{}{}-{}{}", SNAPSHOT_PREFIX, stamp, attempt, suffix)
            };
            let path = self.backups_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(bytes)?;
                    file.sync_all()?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    fn serialize(dataset: &Dataset) -> StorageResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(dataset)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl StorageBackend for FileBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::JsonFile
    }

    fn load_current(&self) -> StorageResult<Dataset> {
        let reason = match self.read_document()? {
            DocumentState::Ready(dataset) => return Ok(dataset),
            DocumentState::Missing => "missing".to_string(),
            DocumentState::Unusable { reason, bytes } => {
                self.preserve_unusable(&bytes);
                reason
            }
        };

        let (dataset, origin) = bootstrap_document(&self.schema, self.seed_file.as_deref());
        let bytes = Self::serialize(&dataset)?;
        self.write_document(&bytes)?;
        self.record_snapshot(&bytes);

        let origin = origin.to_string();
        log_event_with_fields(
            Event::StorageBootstrapped,
            &[
                ("origin", origin.as_str()),
                ("reason", reason.as_str()),
                ("storage", StorageKind::JsonFile.as_str()),
            ],
        );
        Ok(dataset)
    }

    fn persist(&self, dataset: &Dataset) -> StorageResult<()> {
        let bytes = Self::serialize(dataset)?;
        self.write_document(&bytes)?;
        self.record_snapshot(&bytes);
        Ok(())
    }

    fn current_version(&self) -> StorageResult<VersionStamp> {
        let modified = modified_millis(&self.data_file)
            .map_err(|e| StorageError::io(format!("stat {}", self.data_file.display()), e))?;
        Ok(match modified {
            Some(millis) => VersionStamp {
                token: VersionToken::new(millis.to_string()),
                saved_at: DateTime::<Utc>::from_timestamp_millis(millis),
            },
            None => VersionStamp::initial(),
        })
    }

    fn latest_snapshot(&self) -> StorageResult<Dataset> {
        let path = self.backups_dir.join(LATEST_BACKUP_NAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound("no backup snapshot exists".to_string()))
            }
            Err(e) => return Err(StorageError::io(format!("read {}", path.display()), e)),
        };
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("{}: {}", path.display(), e)))?;
        let dataset = Dataset::from_value(value).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(self.schema.normalize(dataset))
    }

    fn snapshot_count(&self) -> StorageResult<u64> {
        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StorageError::io(
                    format!("list {}", self.backups_dir.display()),
                    e,
                ))
            }
        };

        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io("list backups", e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name != LATEST_BACKUP_NAME
                && !name.ends_with(UNUSABLE_SUFFIX)
                && name.starts_with(SNAPSHOT_PREFIX)
                && name.ends_with(SNAPSHOT_SUFFIX)
            {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Push the modification time of `path` past `previous`, trying coarser
/// steps for filesystems that round timestamps to seconds or two seconds.
/// Each attempt is confirmed by reading the time back.
fn advance_mtime(
    path: &Path,
    previous: i64,
    touch: impl Fn(&Path, SystemTime) -> io::Result<()>,
) -> StorageResult<()> {
    let advanced = || -> StorageResult<bool> {
        let current = modified_millis(path)
            .map_err(|e| StorageError::io(format!("stat {}", path.display()), e))?;
        Ok(matches!(current, Some(current) if current > previous))
    };

    if advanced()? {
        return Ok(());
    }
    for candidate in mtime_candidates(previous) {
        let when = UNIX_EPOCH + Duration::from_millis(candidate.max(0) as u64);
        touch(path, when).map_err(|e| StorageError::io(format!("touch {}", path.display()), e))?;
        if advanced()? {
            return Ok(());
        }
    }

    Err(StorageError::Io(format!(
        "modification time of {} did not advance past {}",
        path.display(),
        previous
    )))
}

/// Millisecond, whole-second and even-second successors of `previous`.
fn mtime_candidates(previous: i64) -> [i64; 3] {
    [
        previous + 1,
        (previous.div_euclid(1_000) + 1) * 1_000,
        (previous.div_euclid(2_000) + 1) * 2_000,
    ]
}

fn set_mtime(path: &Path, when: SystemTime) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(when))
}

/// Modification time in Unix milliseconds, `None` when the file is absent.
fn modified_millis(path: &Path) -> io::Result<Option<i64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(system_time_millis(meta.modified()?))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn system_time_millis(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn backend(dir: &Path) -> (FileBackend, Arc<MetricsRegistry>) {
        let metrics = Arc::new(MetricsRegistry::new());
        let backend = FileBackend::new(
            dir,
            Some(dir.join("seed.json")),
            TabSchema::default(),
            metrics.clone(),
        );
        (backend, metrics)
    }

    fn with_record(mut dataset: Dataset, tab: &str, id: &str) -> Dataset {
        dataset.tab_mut(tab).push(json!({ "id": id }));
        dataset
    }

    #[test]
    fn test_fresh_directory_bootstraps_empty() {
        let temp = TempDir::new().unwrap();
        let (backend, metrics) = backend(temp.path());

        assert_eq!(backend.current_version().unwrap(), VersionStamp::initial());

        let doc = backend.load_current().unwrap();
        assert_eq!(doc, TabSchema::default().empty());
        assert!(backend.data_file().exists());
        assert_eq!(backend.snapshot_count().unwrap(), 1);
        assert_eq!(metrics.snapshot().snapshots_created, 1);
        assert_ne!(backend.current_version().unwrap().token, VersionToken::initial());
    }

    #[test]
    fn test_bootstrap_prefers_seed() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("seed.json"), r#"{"leads":[{"id":"lead_1"}]}"#).unwrap();
        let (backend, _) = backend(temp.path());

        let doc = backend.load_current().unwrap();
        assert_eq!(doc.tab("leads").unwrap().len(), 1);
        assert_eq!(backend.latest_snapshot().unwrap(), doc);
    }

    fn preserved_copies(backend: &FileBackend) -> Vec<PathBuf> {
        fs::read_dir(backend.backups_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.to_string_lossy().ends_with(UNUSABLE_SUFFIX))
            .collect()
    }

    #[test]
    fn test_incomplete_document_is_replaced() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(DATA_FILE_NAME), r#"{"leads":[]}"#).unwrap();
        let (backend, _) = backend(temp.path());

        let doc = backend.load_current().unwrap();
        assert_eq!(doc, TabSchema::default().empty());
    }

    #[test]
    fn test_unusable_document_is_set_aside_before_bootstrap() {
        let temp = TempDir::new().unwrap();
        // Every tab but "historical", so the document counts as incomplete.
        let original = br#"{"driversSep":[{"id":"KEEP_ME"}],"leads":[],"otrHires":[],"ag4Hires":[],"ag4Sep":[]}"#;
        fs::write(temp.path().join(DATA_FILE_NAME), original).unwrap();
        let (backend, metrics) = backend(temp.path());

        let doc = backend.load_current().unwrap();
        assert_eq!(doc, TabSchema::default().empty());

        let copies = preserved_copies(&backend);
        assert_eq!(copies.len(), 1);
        assert_eq!(fs::read(&copies[0]).unwrap(), original.to_vec());
        assert_eq!(metrics.snapshot().unusable_documents_preserved, 1);
        // The preserved copy is not a snapshot.
        assert_eq!(backend.snapshot_count().unwrap(), 1);
    }

    #[test]
    fn test_malformed_document_is_set_aside() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(DATA_FILE_NAME), b"{\"leads\": [").unwrap();
        let (backend, _) = backend(temp.path());

        backend.load_current().unwrap();
        let copies = preserved_copies(&backend);
        assert_eq!(copies.len(), 1);
        assert_eq!(fs::read(&copies[0]).unwrap(), b"{\"leads\": [".to_vec());
    }

    #[test]
    fn test_mtime_candidates_cover_coarse_clocks() {
        assert_eq!(
            mtime_candidates(1_718_000_000_000),
            [1_718_000_000_001, 1_718_000_001_000, 1_718_000_002_000]
        );
        assert_eq!(
            mtime_candidates(1_718_000_001_500),
            [1_718_000_001_501, 1_718_000_002_000, 1_718_000_002_000]
        );
    }

    #[test]
    fn test_advance_mtime_moves_past_previous() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DATA_FILE_NAME);
        fs::write(&path, b"{}").unwrap();
        // An mtime ahead of the file's own, as after a same-tick write.
        let previous = modified_millis(&path).unwrap().unwrap() + 5_000;

        advance_mtime(&path, previous, set_mtime).unwrap();
        assert!(modified_millis(&path).unwrap().unwrap() > previous);
    }

    #[test]
    fn test_advance_mtime_errors_when_time_is_stuck() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DATA_FILE_NAME);
        fs::write(&path, b"{}").unwrap();
        let previous = modified_millis(&path).unwrap().unwrap() + 5_000;

        // A filesystem that ignores timestamp updates.
        let err = advance_mtime(&path, previous, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_existing_document_is_read_without_writing() {
        let temp = TempDir::new().unwrap();
        let (backend, _) = backend(temp.path());
        let stored = with_record(TabSchema::default().empty(), "driversSep", "sep_1");
        fs::write(backend.data_file(), serde_json::to_vec(&stored).unwrap()).unwrap();

        assert_eq!(backend.load_current().unwrap(), stored);
        assert_eq!(backend.snapshot_count().unwrap(), 0);
    }

    #[test]
    fn test_persist_appends_snapshot_and_changes_token() {
        let temp = TempDir::new().unwrap();
        let (backend, _) = backend(temp.path());
        let base = backend.load_current().unwrap();

        let mut tokens = vec![backend.current_version().unwrap().token];
        for i in 0..3 {
            let doc = with_record(base.clone(), "leads", &format!("lead_{}", i));
            backend.persist(&doc).unwrap();
            tokens.push(backend.current_version().unwrap().token);
            assert_eq!(backend.latest_snapshot().unwrap(), doc);
        }

        assert_eq!(backend.snapshot_count().unwrap(), 4);
        for pair in tokens.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_latest_snapshot_not_found() {
        let temp = TempDir::new().unwrap();
        let (backend, _) = backend(temp.path());
        assert!(backend.latest_snapshot().unwrap_err().is_not_found());
    }

    #[test]
    fn test_backup_failure_does_not_fail_write() {
        let temp = TempDir::new().unwrap();
        let (backend, metrics) = backend(temp.path());
        // A plain file where the backups directory should be.
        fs::write(backend.backups_dir(), b"not a directory").unwrap();

        let doc = backend.load_current().unwrap();
        backend.persist(&with_record(doc, "ag4Sep", "ag4sep_1")).unwrap();

        let snap = metrics.snapshot();
        assert_eq!(snap.backup_copy_failures, 2);
        assert_eq!(snap.snapshots_created, 0);
        assert_eq!(
            backend.load_current().unwrap().tab("ag4Sep").unwrap().len(),
            1
        );
    }

    #[test]
    fn test_staging_failure_falls_back_to_direct_write() {
        let temp = TempDir::new().unwrap();
        let (backend, metrics) = backend(temp.path());
        let doc = backend.load_current().unwrap();
        // A directory at the staging path makes the staged write fail.
        fs::create_dir(temp.path().join("db.json.tmp")).unwrap();

        let updated = with_record(doc, "historical", "hist_1");
        backend.persist(&updated).unwrap();

        assert_eq!(metrics.snapshot().atomic_rename_fallbacks, 1);
        assert_eq!(backend.load_current().unwrap(), updated);
    }

    #[test]
    fn test_read_existing_does_not_bootstrap() {
        let temp = TempDir::new().unwrap();
        let (backend, _) = backend(temp.path());
        assert_eq!(backend.read_existing().unwrap(), None);
        assert!(!backend.data_file().exists());
    }
}
