//! Job processor: runs generation attempts, reports progress, and drives
//! jobs to a terminal status.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use courseforge_core::{CourseArtifact, CourseSpec};

use crate::notify::{Notification, Notifier};
use crate::progress::ProgressCache;
use crate::store::{JobStore, StoreError};
use crate::types::{GenerationJob, ProgressUpdate, RetryPolicy};

/// Error from the external generation service.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    #[error("generation failed: {0}")]
    Failed(String),
    #[error("generator rejected spec: {0}")]
    Rejected(String),
}

/// Callback handed to the generator; invoked zero or more times with
/// incremental status before the call resolves.
pub type ProgressSink = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// External AI generation service seam. Out of scope for the queue; the
/// spec payload is forwarded verbatim and the result is opaque.
#[async_trait]
pub trait CourseGenerator: Send + Sync {
    async fn generate(
        &self,
        spec: &CourseSpec,
        progress: ProgressSink,
    ) -> Result<CourseArtifact, GeneratorError>;
}

/// Drives a single job from dispatch to a terminal status.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    generator: Arc<dyn CourseGenerator>,
    notifier: Arc<dyn Notifier>,
    progress: Arc<ProgressCache>,
    retry: RetryPolicy,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn CourseGenerator>,
        notifier: Arc<dyn Notifier>,
        progress: Arc<ProgressCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            generator,
            notifier,
            progress,
            retry,
        }
    }

    /// Process a job to completion or failure. Never returns an error: the
    /// pipeline is fire-and-forget once dispatched, so everything terminal
    /// lands in the store and the notification channels.
    pub async fn process(&self, mut job: GenerationJob) {
        let id = job.id.clone();

        match self.run_attempts(&mut job).await {
            Ok(artifact) => match self.store.move_to_history(&id, artifact).await {
                Ok(record) => {
                    info!(job = %id, "generation completed");
                    let notification = Notification::new(
                        "Course ready",
                        format!("\"{}\" has been generated", record.title),
                    )
                    .with_icon("icons/generation-success.png")
                    .with_data(json!({
                        "jobId": id.as_str(),
                        "course": record.result.course,
                    }))
                    .with_action("view", "View course");
                    self.send(notification).await;
                }
                Err(err) => {
                    error!(job = %id, error = %err, "failed to move completed job to history");
                }
            },
            Err(err) => {
                warn!(job = %id, error = %err, "generation failed after all attempts");
                job.mark_failed(err.to_string());
                if let Err(store_err) = self.store.update(&job).await {
                    error!(job = %id, error = %store_err, "failed to record terminal failure");
                }
                let notification = Notification::new(
                    "Generation failed",
                    format!("\"{}\" could not be generated", job.title),
                )
                .with_icon("icons/generation-failed.png")
                .with_data(json!({ "jobId": id.as_str() }))
                .with_action("retry", "Retry")
                .with_action("dismiss", "Dismiss");
                self.send(notification).await;
            }
        }

        self.progress.clear(&id);
    }

    /// Run generation attempts up to the retry ceiling, sleeping the backoff
    /// delay before each retry.
    async fn run_attempts(&self, job: &mut GenerationJob) -> Result<CourseArtifact, GeneratorError> {
        loop {
            job.mark_processing();
            if let Err(err) = self.store.update(job).await {
                // A job can vanish mid-flight only via external cleanup; give up quietly.
                warn!(job = %job.id, error = %err, "could not record attempt");
                if matches!(err, StoreError::NotFound(_)) {
                    return Err(GeneratorError::Failed("job no longer queued".to_string()));
                }
            }

            debug!(job = %job.id, attempt = job.attempt, "starting generation attempt");
            match self.run_one(job).await {
                Ok(artifact) => return Ok(artifact),
                Err(err) => {
                    warn!(job = %job.id, attempt = job.attempt, error = %err, "attempt failed");
                    job.last_error = Some(err.to_string());

                    if !self.retry.should_retry(job.attempt) {
                        return Err(err);
                    }
                    let delay = self.retry.delay_for_attempt(job.attempt + 1);
                    debug!(job = %job.id, ?delay, "backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One generation call, draining progress callbacks as they arrive.
    async fn run_one(&self, job: &GenerationJob) -> Result<CourseArtifact, GeneratorError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: ProgressSink = Arc::new(move |update| {
            let _ = tx.send(update);
        });

        let generate = self.generator.generate(&job.spec, sink);
        tokio::pin!(generate);

        let result = loop {
            tokio::select! {
                result = &mut generate => break result,
                Some(update) = rx.recv() => self.apply_progress(job, update).await,
            }
        };

        // Deliver updates that raced with completion.
        while let Ok(update) = rx.try_recv() {
            self.apply_progress(job, update).await;
        }

        result
    }

    /// Overwrite the progress entry; milestone steps additionally notify.
    async fn apply_progress(&self, job: &GenerationJob, update: ProgressUpdate) {
        self.progress.record(&job.id, update.clone());

        if update.step.is_milestone() {
            let notification = Notification::new(job.title.clone(), update.message.clone())
                .with_data(json!({
                    "jobId": job.id.as_str(),
                    "step": update.step.as_str(),
                    "percent": update.percent,
                }));
            self.send(notification).await;
        }
    }

    /// Single fire-and-forget send path; delivery failure never reaches the
    /// job pipeline.
    async fn send(&self, notification: Notification) {
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(error = %err, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use courseforge_core::UserId;

    use crate::notify::NotifyError;
    use crate::store::InMemoryJobStore;
    use crate::types::{JobStatus, ProgressStep};

    struct AlwaysFails {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CourseGenerator for AlwaysFails {
        async fn generate(
            &self,
            _spec: &CourseSpec,
            _progress: ProgressSink,
        ) -> Result<CourseArtifact, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GeneratorError::Failed("model unavailable".to_string()))
        }
    }

    struct Quiet;

    #[async_trait]
    impl Notifier for Quiet {
        async fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn processor_with(
        store: Arc<InMemoryJobStore>,
        generator: Arc<dyn CourseGenerator>,
    ) -> JobProcessor {
        JobProcessor::new(
            store,
            generator,
            Arc::new(Quiet),
            Arc::new(ProgressCache::new()),
            RetryPolicy::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_exactly_three_attempts_with_doubled_backoff() {
        let store = Arc::new(InMemoryJobStore::new());
        let generator = Arc::new(AlwaysFails {
            calls: AtomicU32::new(0),
        });
        let processor = processor_with(store.clone(), generator.clone());

        let job = GenerationJob::new(CourseSpec::new("Algebra Basics"), UserId::new());
        let id = job.id.clone();
        store.insert_pending(job.clone()).await.unwrap();

        let started = tokio::time::Instant::now();
        processor.process(job).await;

        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
        // 5s before attempt 2, 10s before attempt 3.
        assert!(started.elapsed() >= Duration::from_secs(15));

        let stored = store.get_pending(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempt, 3);
        assert!(stored.last_error.is_some());
    }

    struct SucceedsWithProgress;

    #[async_trait]
    impl CourseGenerator for SucceedsWithProgress {
        async fn generate(
            &self,
            _spec: &CourseSpec,
            progress: ProgressSink,
        ) -> Result<CourseArtifact, GeneratorError> {
            progress(ProgressUpdate::new(ProgressStep::Outline, "outlining", 10));
            progress(ProgressUpdate::new(ProgressStep::Curriculum, "curriculum drafted", 40));
            Ok(CourseArtifact::new(serde_json::json!({"id": "course42"})))
        }
    }

    #[tokio::test]
    async fn success_moves_job_to_history_and_clears_progress() {
        let store = Arc::new(InMemoryJobStore::new());
        let progress = Arc::new(ProgressCache::new());
        let processor = JobProcessor::new(
            store.clone(),
            Arc::new(SucceedsWithProgress),
            Arc::new(Quiet),
            progress.clone(),
            RetryPolicy::default(),
        );

        let owner = UserId::new();
        let job = GenerationJob::new(CourseSpec::new("Algebra Basics"), owner);
        let id = job.id.clone();
        store.insert_pending(job.clone()).await.unwrap();

        processor.process(job).await;

        assert!(store.get_pending(&id).await.unwrap().is_none());
        let history = store.list_history(&owner).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].result.course["id"], "course42");
        assert!(progress.get(&id).is_none());
    }
}
