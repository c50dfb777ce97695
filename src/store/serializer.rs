//! # Write Serializer
//!
//! A FIFO queue drained by a single worker task. Every submitted job runs
//! to completion before the next one starts, in submission order, and its
//! result goes back to its own submitter only.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};

use super::errors::{StoreError, StoreResult};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone)]
pub struct WriteSerializer {
    sender: mpsc::UnboundedSender<Job>,
}

impl WriteSerializer {
    /// Start the worker on the current tokio runtime.
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                // A panicking job drops its reply channel; the queue keeps going.
                let _ = AssertUnwindSafe(job()).catch_unwind().await;
            }
        });

        Self { sender }
    }

    /// Queue `op` behind every job already submitted and wait for its result.
    ///
    /// Once queued the job runs even if the caller stops waiting.
    pub async fn submit<F, Fut, T>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let _ = reply.send(op().await);
            }
            .boxed()
        });

        self.sender
            .send(job)
            .map_err(|_| StoreError::StorageUnavailable("write queue is closed".to_string()))?;

        response
            .await
            .map_err(|_| StoreError::StorageUnavailable("write job was abandoned".to_string()))?
    }
}
