//! Dispatch strategies for queued jobs.
//!
//! The platform either offers a longer-lived host for background execution
//! (a running multi-task runtime we can spawn onto) or it does not, in which
//! case processing runs inline in the caller's task. The capability is probed
//! once at startup; enqueue never re-probes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::debug;

/// Boxed processing future handed to a dispatcher.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Which strategy the probe selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Job handed to a longer-lived host; enqueue returns before processing.
    Deferred,
    /// Job awaited inline in the enqueueing task (degraded mode).
    Immediate,
}

#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: JobFuture);

    fn mode(&self) -> DispatchMode;
}

/// Spawns processing onto a runtime handle so it outlives the enqueue call.
pub struct DeferredDispatcher {
    handle: Handle,
}

impl DeferredDispatcher {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl JobDispatcher for DeferredDispatcher {
    async fn dispatch(&self, job: JobFuture) {
        self.handle.spawn(job);
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Deferred
    }
}

/// Runs processing to completion inside the caller's task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateDispatcher;

#[async_trait]
impl JobDispatcher for ImmediateDispatcher {
    async fn dispatch(&self, job: JobFuture) {
        job.await;
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Immediate
    }
}

/// Probe for a background-capable host and pick the strategy once.
///
/// An explicitly supplied handle wins; otherwise the ambient runtime is
/// probed. Without either, jobs run inline.
pub fn probe(explicit: Option<Handle>) -> Arc<dyn JobDispatcher> {
    let handle = explicit.or_else(|| Handle::try_current().ok());
    match handle {
        Some(handle) => {
            debug!("background dispatch available, deferring jobs");
            Arc::new(DeferredDispatcher::new(handle))
        }
        None => {
            debug!("no background host, jobs run inline");
            Arc::new(ImmediateDispatcher)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_inside_runtime_defers() {
        let dispatcher = probe(None);
        assert_eq!(dispatcher.mode(), DispatchMode::Deferred);
    }

    #[test]
    fn probe_without_runtime_falls_back_to_inline() {
        let dispatcher = std::thread::spawn(|| probe(None)).join().unwrap();
        assert_eq!(dispatcher.mode(), DispatchMode::Immediate);
    }

    #[tokio::test]
    async fn immediate_dispatch_runs_to_completion() {
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen = flag.clone();

        ImmediateDispatcher
            .dispatch(Box::pin(async move {
                seen.store(true, std::sync::atomic::Ordering::SeqCst);
            }))
            .await;

        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }
}
