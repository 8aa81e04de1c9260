//! Core queue types and retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courseforge_core::{CourseArtifact, CourseSpec, GenerationId, UserId};

/// Execution status of a queued generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, waiting for dispatch.
    Pending,
    /// Generation in flight.
    Processing,
    /// Generation succeeded; record lives in history.
    Completed,
    /// All attempts exhausted; record stays in the pending collection.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal statuses are absorbing: once reached, status updates are no-ops.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A queued course-generation request (pending-collection record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: GenerationId,
    pub title: String,
    pub spec: CourseSpec,
    pub owner: UserId,
    pub status: JobStatus,
    /// Attempt counter, starts at 0 and is bumped before each generation call.
    pub attempt: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(spec: CourseSpec, owner: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: GenerationId::generate(),
            title: spec.title.clone(),
            spec,
            owner,
            status: JobStatus::Pending,
            attempt: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the next generation attempt as in flight.
    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    /// Mark the job terminally failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }
}

/// Durable record of a completed generation. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: GenerationId,
    pub title: String,
    pub spec: CourseSpec,
    pub owner: UserId,
    pub result: CourseArtifact,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn from_job(job: GenerationJob, result: CourseArtifact, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: job.id,
            title: job.title,
            spec: job.spec,
            owner: job.owner,
            result,
            created_at: job.created_at,
            completed_at,
        }
    }
}

/// Named stage reported by the generator while a job is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ProgressStep {
    Outline,
    Curriculum,
    Lessons,
    Quizzes,
    Complete,
    Error,
    Other(String),
}

impl ProgressStep {
    pub fn as_str(&self) -> &str {
        match self {
            ProgressStep::Outline => "outline",
            ProgressStep::Curriculum => "curriculum",
            ProgressStep::Lessons => "lessons",
            ProgressStep::Quizzes => "quizzes",
            ProgressStep::Complete => "complete",
            ProgressStep::Error => "error",
            ProgressStep::Other(name) => name,
        }
    }

    /// Only milestone steps produce user notifications; everything else is
    /// recorded silently to avoid notification spam.
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            ProgressStep::Curriculum | ProgressStep::Complete | ProgressStep::Error
        )
    }
}

impl From<String> for ProgressStep {
    fn from(value: String) -> Self {
        match value.as_str() {
            "outline" => ProgressStep::Outline,
            "curriculum" => ProgressStep::Curriculum,
            "lessons" => ProgressStep::Lessons,
            "quizzes" => ProgressStep::Quizzes,
            "complete" => ProgressStep::Complete,
            "error" => ProgressStep::Error,
            _ => ProgressStep::Other(value),
        }
    }
}

impl From<ProgressStep> for String {
    fn from(value: ProgressStep) -> Self {
        value.as_str().to_owned()
    }
}

/// Last-known progress of an in-flight job. Ephemeral; overwritten on every
/// callback and cleared when the job reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub step: ProgressStep,
    pub message: String,
    /// Completion percentage, clamped to 0..=100.
    pub percent: u8,
    pub updated_at: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(step: ProgressStep, message: impl Into<String>, percent: u8) -> Self {
        Self {
            step,
            message: message.into(),
            percent: percent.min(100),
            updated_at: Utc::now(),
        }
    }
}

/// Retry policy for failed generation calls: a fixed attempt ceiling with the
/// base delay doubled before each retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempt ceiling (first try included).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Optional cap on the computed delay.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(5000),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: None,
        }
    }

    /// Delay to sleep before executing attempt `attempt` (1-indexed).
    ///
    /// The first attempt runs immediately; retry `n` waits `base * 2^(n-2)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts have run.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(10000));
    }

    #[test]
    fn backoff_respects_cap() {
        let mut policy = RetryPolicy::new(5, Duration::from_secs(5));
        policy.max_delay = Some(Duration::from_secs(8));

        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn should_retry_respects_ceiling() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn milestone_allow_list() {
        assert!(ProgressStep::Curriculum.is_milestone());
        assert!(ProgressStep::Complete.is_milestone());
        assert!(ProgressStep::Error.is_milestone());
        assert!(!ProgressStep::Outline.is_milestone());
        assert!(!ProgressStep::Lessons.is_milestone());
        assert!(!ProgressStep::Other("embedding".into()).is_milestone());
    }

    #[test]
    fn status_round_trips_through_serde() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");

        let status: JobStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, JobStatus::Failed);
    }
}
