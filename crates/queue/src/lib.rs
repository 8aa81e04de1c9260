//! Background course-generation queue with local persistence, retry, and
//! best-effort notifications.
//!
//! ## Design
//!
//! - Jobs are owner-scoped and persisted locally (SQLite) before dispatch
//! - Fixed retry ceiling with exponential backoff between attempts
//! - Completed jobs move atomically from the pending collection to history
//! - Progress is ephemeral and best-effort; milestones notify, the rest stay silent
//! - Notification delivery never blocks or fails the job pipeline
//!
//! ## Components
//!
//! - [`GenerationQueue`]: the public API (enqueue, list, progress, cleanup)
//! - [`store::JobStore`]: pending + history persistence (SQLite or in-memory)
//! - [`processor::JobProcessor`]: runs attempts with retry/backoff
//! - [`dispatch::JobDispatcher`]: deferred (background host) or inline execution
//! - [`notify::Notifier`]: fire-and-forget user notices

pub mod dispatch;
pub mod notify;
pub mod processor;
pub mod progress;
pub mod service;
pub mod sqlite;
pub mod store;
pub mod types;

pub use dispatch::{DispatchMode, JobDispatcher};
pub use notify::{Notification, NotificationAction, Notifier, WorkerMessage};
pub use processor::{CourseGenerator, GeneratorError, ProgressSink};
pub use progress::ProgressCache;
pub use service::{GenerationQueue, QueueConfig, QueueError, StoreLocation};
pub use sqlite::SqliteJobStore;
pub use store::{InMemoryJobStore, JobStore, StoreError};
pub use types::{
    GenerationJob, HistoryRecord, JobStatus, ProgressStep, ProgressUpdate, RetryPolicy,
};
