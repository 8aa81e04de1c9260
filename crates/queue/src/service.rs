//! Public queue API.
//!
//! [`GenerationQueue::open`] awaits store initialization and probes the
//! dispatch capability once, returning a ready-to-use handle. There is no
//! ambient singleton; embedders own the handle and its configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use courseforge_core::{CourseSpec, DomainError, GenerationId, UserId};

use crate::dispatch::{self, JobDispatcher};
use crate::notify::Notifier;
use crate::processor::{CourseGenerator, JobProcessor};
use crate::progress::ProgressCache;
use crate::sqlite::{self, SqliteJobStore};
use crate::store::{InMemoryJobStore, JobStore, StoreError};
use crate::types::{GenerationJob, HistoryRecord, JobStatus, ProgressUpdate, RetryPolicy};

/// Where the durable store lives.
#[derive(Debug, Clone, Default)]
pub enum StoreLocation {
    /// `{os data dir}/courseforge/queue.db`.
    #[default]
    OsDataDir,
    /// Explicit database file path.
    Path(PathBuf),
    /// Non-durable in-memory store (tests, ephemeral embedding).
    InMemory,
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub store: StoreLocation,
    pub retry: RetryPolicy,
    /// TTL for stale progress entries swept by [`GenerationQueue::prune_stale_progress`].
    pub progress_ttl: Duration,
    /// Explicit runtime handle for the dispatch probe; `None` probes the
    /// ambient runtime.
    pub runtime: Option<tokio::runtime::Handle>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            store: StoreLocation::default(),
            retry: RetryPolicy::default(),
            progress_ttl: Duration::from_secs(60 * 60),
            runtime: None,
        }
    }
}

impl QueueConfig {
    pub fn in_memory() -> Self {
        Self {
            store: StoreLocation::InMemory,
            ..Self::default()
        }
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store = StoreLocation::Path(path.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress_ttl(mut self, ttl: Duration) -> Self {
        self.progress_ttl = ttl;
        self
    }

    pub fn with_runtime(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }
}

/// Queue-level error.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    InvalidSpec(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Retry was requested for a job that is not in the `failed` state.
    #[error("job {0} is not retriable")]
    NotRetriable(GenerationId),
}

/// Handle to the background generation queue.
pub struct GenerationQueue {
    store: Arc<dyn JobStore>,
    processor: Arc<JobProcessor>,
    dispatcher: Arc<dyn JobDispatcher>,
    progress: Arc<ProgressCache>,
    progress_ttl: Duration,
}

impl GenerationQueue {
    /// Open the queue: initialize the store, probe dispatch capability, and
    /// return a ready handle.
    pub async fn open(
        config: QueueConfig,
        generator: Arc<dyn CourseGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, QueueError> {
        let store: Arc<dyn JobStore> = match &config.store {
            StoreLocation::OsDataDir => {
                let path = sqlite::default_db_path()?;
                Arc::new(SqliteJobStore::open(&path).await?)
            }
            StoreLocation::Path(path) => Arc::new(SqliteJobStore::open(path).await?),
            StoreLocation::InMemory => Arc::new(InMemoryJobStore::new()),
        };

        let dispatcher = dispatch::probe(config.runtime.clone());
        let progress = Arc::new(ProgressCache::new());
        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            generator,
            notifier,
            progress.clone(),
            config.retry.clone(),
        ));

        info!(mode = ?dispatcher.mode(), "generation queue opened");

        Ok(Self {
            store,
            processor,
            dispatcher,
            progress,
            progress_ttl: config.progress_ttl,
        })
    }

    /// Queue a generation request. The job is persisted as `pending` and
    /// handed to the dispatcher; the new id is returned regardless of whether
    /// processing has started.
    pub async fn queue_generation(
        &self,
        spec: CourseSpec,
        owner: UserId,
    ) -> Result<GenerationId, QueueError> {
        spec.validate()?;

        let job = GenerationJob::new(spec, owner);
        let id = job.id.clone();
        self.store.insert_pending(job.clone()).await?;

        let processor = self.processor.clone();
        self.dispatcher
            .dispatch(Box::pin(async move {
                processor.process(job).await;
            }))
            .await;

        Ok(id)
    }

    /// All pending-collection jobs owned by the caller, oldest first.
    pub async fn pending_requests(&self, owner: &UserId) -> Result<Vec<GenerationJob>, QueueError> {
        Ok(self.store.list_pending(owner).await?)
    }

    /// Completed generations owned by the caller, newest first.
    pub async fn generation_history(
        &self,
        owner: &UserId,
    ) -> Result<Vec<HistoryRecord>, QueueError> {
        Ok(self.store.list_history(owner).await?)
    }

    /// Idempotent status overwrite. Fails with `NotFound` once the job has
    /// been moved to history; terminal statuses are immutable.
    pub async fn update_request_status(
        &self,
        id: &GenerationId,
        status: JobStatus,
    ) -> Result<JobStatus, QueueError> {
        Ok(self.store.update_status(id, status, None).await?)
    }

    /// Best-effort, non-blocking read of the last-known progress.
    pub fn progress(&self, id: &GenerationId) -> Option<ProgressUpdate> {
        self.progress.get(id)
    }

    /// Sweep progress entries older than the configured TTL.
    pub fn prune_stale_progress(&self) -> usize {
        self.progress.prune_stale(self.progress_ttl)
    }

    /// Delete history records completed more than `max_age_days` ago.
    /// Returns the number of deleted records.
    pub async fn cleanup_old_requests(&self, max_age_days: u32) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(max_age_days));
        Ok(self.store.purge_history_before(cutoff).await?)
    }

    /// Re-enqueue the spec of a failed job under a fresh id (the backend of
    /// the failure notification's "retry" action).
    pub async fn retry_failed(&self, id: &GenerationId) -> Result<GenerationId, QueueError> {
        let job = self
            .store
            .get_pending(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if job.status != JobStatus::Failed {
            return Err(QueueError::NotRetriable(id.clone()));
        }

        self.queue_generation(job.spec, job.owner).await
    }
}
