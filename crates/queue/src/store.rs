//! Local job storage: the pending and history collections.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courseforge_core::{CourseArtifact, GenerationId, UserId};

use crate::types::{GenerationJob, HistoryRecord, JobStatus};

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The durable store failed to open or initialize.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Primary-key collision on insert.
    #[error("duplicate job id: {0}")]
    DuplicateId(GenerationId),
    /// The referenced job is absent from the expected collection. Expected
    /// once a job has been moved to history.
    #[error("job not found: {0}")]
    NotFound(GenerationId),
    /// Backend failure (I/O, corrupt row, ...).
    #[error("storage error: {0}")]
    Storage(String),
}

/// Two-collection job store: pending jobs plus completed-job history.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job. Fails with `DuplicateId` on key collision.
    async fn insert_pending(&self, job: GenerationJob) -> Result<(), StoreError>;

    /// Fetch a pending job by id.
    async fn get_pending(&self, id: &GenerationId) -> Result<Option<GenerationJob>, StoreError>;

    /// Replace a pending job record wholesale. Internal bookkeeping path;
    /// status monotonicity is the caller's concern here.
    async fn update(&self, job: &GenerationJob) -> Result<(), StoreError>;

    /// Overwrite the status of a pending job, idempotently.
    ///
    /// Terminal statuses are absorbing: updating a completed or failed job is
    /// a no-op. Returns the status in place after the call.
    async fn update_status(
        &self,
        id: &GenerationId,
        status: JobStatus,
        last_error: Option<String>,
    ) -> Result<JobStatus, StoreError>;

    /// All pending-collection jobs owned by `owner`, oldest first.
    /// Unpaginated; per-user volumes are expected to stay small.
    async fn list_pending(&self, owner: &UserId) -> Result<Vec<GenerationJob>, StoreError>;

    /// Atomically move a pending job to history with its result attached.
    async fn move_to_history(
        &self,
        id: &GenerationId,
        result: CourseArtifact,
    ) -> Result<HistoryRecord, StoreError>;

    /// History records owned by `owner`, newest first.
    async fn list_history(&self, owner: &UserId) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Delete history records completed before `cutoff`, via the completion
    /// timestamp index. Returns the number of deleted records.
    async fn purge_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory job store for tests and non-durable embedding.
///
/// History is keyed by `(completed_at, id)` so age-based cleanup walks an
/// ordered index instead of scanning.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    pending: RwLock<HashMap<GenerationId, GenerationJob>>,
    history: RwLock<BTreeMap<(DateTime<Utc>, GenerationId), HistoryRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_pending(&self, job: GenerationJob) -> Result<(), StoreError> {
        let mut pending = self.pending.write().unwrap();
        if pending.contains_key(&job.id) {
            return Err(StoreError::DuplicateId(job.id));
        }
        pending.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_pending(&self, id: &GenerationId) -> Result<Option<GenerationJob>, StoreError> {
        let pending = self.pending.read().unwrap();
        Ok(pending.get(id).cloned())
    }

    async fn update(&self, job: &GenerationJob) -> Result<(), StoreError> {
        let mut pending = self.pending.write().unwrap();
        if !pending.contains_key(&job.id) {
            return Err(StoreError::NotFound(job.id.clone()));
        }
        pending.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        id: &GenerationId,
        status: JobStatus,
        last_error: Option<String>,
    ) -> Result<JobStatus, StoreError> {
        let mut pending = self.pending.write().unwrap();
        let job = pending
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if job.status.is_terminal() {
            return Ok(job.status);
        }

        job.status = status;
        if last_error.is_some() {
            job.last_error = last_error;
        }
        job.updated_at = Utc::now();
        Ok(job.status)
    }

    async fn list_pending(&self, owner: &UserId) -> Result<Vec<GenerationJob>, StoreError> {
        let pending = self.pending.read().unwrap();
        let mut jobs: Vec<_> = pending
            .values()
            .filter(|j| j.owner == *owner)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn move_to_history(
        &self,
        id: &GenerationId,
        result: CourseArtifact,
    ) -> Result<HistoryRecord, StoreError> {
        // Both locks held across the move keeps it all-or-nothing.
        let mut pending = self.pending.write().unwrap();
        let mut history = self.history.write().unwrap();

        let job = pending
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let record = HistoryRecord::from_job(job, result, Utc::now());
        history.insert((record.completed_at, record.id.clone()), record.clone());
        Ok(record)
    }

    async fn list_history(&self, owner: &UserId) -> Result<Vec<HistoryRecord>, StoreError> {
        let history = self.history.read().unwrap();
        let records: Vec<_> = history
            .values()
            .rev()
            .filter(|r| r.owner == *owner)
            .cloned()
            .collect();
        Ok(records)
    }

    async fn purge_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut history = self.history.write().unwrap();
        // Ordered walk: stop at the first record newer than the cutoff.
        let doomed: Vec<_> = history
            .keys()
            .take_while(|(completed_at, _)| *completed_at < cutoff)
            .cloned()
            .collect();
        for key in &doomed {
            history.remove(key);
        }
        Ok(doomed.len() as u64)
    }
}
