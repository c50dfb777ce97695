//! # State Store
//!
//! Composition root over one `StorageBackend`:
//!
//! - every read and write of the document goes through the `WriteSerializer`,
//!   so a returned `(dataset, token)` pair always describes one committed
//!   state and at most one physical write is in flight;
//! - `put` requires the caller's version token and compares it twice: once
//!   before queueing (cheap rejection) and again inside the queued job right
//!   before the physical write, so a stale token never mutates storage;
//! - the version oracle is the backend's `current_version`.

mod errors;
mod serializer;

pub use errors::{StoreError, StoreResult};
pub use serializer::WriteSerializer;

use std::sync::Arc;

use crate::dataset::{Dataset, TabSchema, VersionStamp, VersionToken};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::storage::{StorageBackend, StorageKind, StorageResult};

/// Outcome of a queued write, decided inside the serializer
enum WriteAttempt {
    Committed(VersionStamp),
    Stale(VersionToken),
}

/// Shared handle to the one live dataset
#[derive(Debug, Clone)]
pub struct StateStore {
    backend: Arc<dyn StorageBackend>,
    schema: TabSchema,
    serializer: WriteSerializer,
    metrics: Arc<MetricsRegistry>,
}

impl StateStore {
    /// Start the write worker and bootstrap the current document.
    ///
    /// Must run inside a tokio runtime. A failure here means storage is
    /// unusable and the process should not serve.
    pub async fn open(
        backend: Arc<dyn StorageBackend>,
        schema: TabSchema,
        metrics: Arc<MetricsRegistry>,
    ) -> StoreResult<Self> {
        let store = Self {
            backend,
            schema,
            serializer: WriteSerializer::spawn(),
            metrics,
        };
        store.get().await?;
        Ok(store)
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.backend.kind()
    }

    pub fn schema(&self) -> &TabSchema {
        &self.schema
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Current normalized dataset and the token describing it.
    pub async fn get(&self) -> StoreResult<(Dataset, VersionToken)> {
        let backend = self.backend.clone();
        let schema = self.schema.clone();
        self.serializer
            .submit(move || async move {
                on_blocking_pool(backend, move |b| {
                    let dataset = b.load_current()?;
                    let stamp = b.current_version()?;
                    Ok((schema.normalize(dataset), stamp.token))
                })
                .await
            })
            .await
    }

    /// Current version, read directly from the backend.
    ///
    /// May observe the state just before or just after a concurrent write.
    pub async fn version(&self) -> StoreResult<VersionStamp> {
        on_blocking_pool(self.backend.clone(), |b| b.current_version()).await
    }

    /// Replace the dataset if `expected` matches the current token.
    ///
    /// Returns the post-write version. Unknown tabs are kept; missing
    /// required and extra tabs are filled with `[]`.
    pub async fn put(
        &self,
        dataset: Dataset,
        expected: Option<VersionToken>,
    ) -> StoreResult<VersionStamp> {
        let expected = expected.ok_or(StoreError::PreconditionMissing)?;

        let current = self.version().await?.token;
        if current != expected {
            return Err(self.conflict(&expected, current));
        }

        let dataset = self.schema.normalize(dataset);
        let backend = self.backend.clone();
        let guard = expected.clone();
        let attempt = self
            .serializer
            .submit(move || async move {
                on_blocking_pool(backend, move |b| {
                    let current = b.current_version()?.token;
                    if current != guard {
                        return Ok(WriteAttempt::Stale(current));
                    }
                    b.persist(&dataset)?;
                    Ok(WriteAttempt::Committed(b.current_version()?))
                })
                .await
            })
            .await;

        match attempt {
            Ok(WriteAttempt::Committed(stamp)) => {
                self.metrics.increment_writes_committed();
                log_event_with_fields(
                    Event::WriteCommit,
                    &[
                        ("previous", expected.as_str()),
                        ("version", stamp.token.as_str()),
                    ],
                );
                Ok(stamp)
            }
            Ok(WriteAttempt::Stale(current)) => Err(self.conflict(&expected, current)),
            Err(err) => {
                self.metrics.increment_writes_failed();
                let detail = err.to_string();
                log_event_with_fields(Event::WriteFailed, &[("detail", detail.as_str())]);
                Err(err)
            }
        }
    }

    /// Dataset of the most recent snapshot.
    pub async fn latest_backup(&self) -> StoreResult<Dataset> {
        on_blocking_pool(self.backend.clone(), |b| b.latest_snapshot()).await
    }

    pub async fn snapshot_count(&self) -> StoreResult<u64> {
        on_blocking_pool(self.backend.clone(), |b| b.snapshot_count()).await
    }

    fn conflict(&self, expected: &VersionToken, current: VersionToken) -> StoreError {
        self.metrics.increment_write_conflicts();
        log_event_with_fields(
            Event::WriteConflict,
            &[("current", current.as_str()), ("expected", expected.as_str())],
        );
        StoreError::VersionConflict { current }
    }
}

/// Run blocking backend work off the async worker threads.
async fn on_blocking_pool<F, T>(backend: Arc<dyn StorageBackend>, work: F) -> StoreResult<T>
where
    F: FnOnce(&dyn StorageBackend) -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || work(backend.as_ref()))
        .await
        .map_err(|e| StoreError::StorageUnavailable(format!("storage task failed: {}", e)))?
        .map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileBackend;
    use serde_json::json;
    use tempfile::TempDir;

    async fn file_store(temp: &TempDir) -> StateStore {
        let metrics = Arc::new(MetricsRegistry::new());
        let backend = Arc::new(FileBackend::new(
            temp.path(),
            None,
            TabSchema::default(),
            metrics.clone(),
        ));
        StateStore::open(backend, TabSchema::default(), metrics)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_without_token_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp).await;

        let err = store.put(TabSchema::default().empty(), None).await.unwrap_err();
        assert!(matches!(err, StoreError::PreconditionMissing));
    }

    #[tokio::test]
    async fn test_put_normalizes_and_keeps_unknown_tabs() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp).await;
        let (_, token) = store.get().await.unwrap();

        let body = Dataset::from_value(json!({"custom": [1], "leads": [{"id": "lead_1"}]})).unwrap();
        store.put(body, Some(token)).await.unwrap();

        let (stored, _) = store.get().await.unwrap();
        assert_eq!(stored.tab("custom").unwrap().len(), 1);
        assert_eq!(stored.tab("leads").unwrap().len(), 1);
        assert_eq!(stored.tab("historical"), Some(&Vec::new()));
    }

    #[tokio::test]
    async fn test_stale_token_counts_conflict() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp).await;

        let err = store
            .put(TabSchema::default().empty(), Some(VersionToken::new("stale")))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.metrics().snapshot().write_conflicts, 1);
        assert_eq!(store.snapshot_count().await.unwrap(), 1);
    }
}
