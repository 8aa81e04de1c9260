//! Ephemeral progress cache.
//!
//! Best-effort, non-durable: entries are overwritten on every callback,
//! cleared when their job reaches a terminal status, and swept by TTL so
//! abandoned jobs cannot leak entries forever.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;

use courseforge_core::GenerationId;

use crate::types::ProgressUpdate;

#[derive(Debug, Default)]
pub struct ProgressCache {
    entries: RwLock<HashMap<GenerationId, ProgressUpdate>>,
}

impl ProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for `id` with the latest update.
    pub fn record(&self, id: &GenerationId, update: ProgressUpdate) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(id.clone(), update);
    }

    /// Non-blocking read of the last-known progress, if any.
    pub fn get(&self, id: &GenerationId) -> Option<ProgressUpdate> {
        let entries = self.entries.read().unwrap();
        entries.get(id).cloned()
    }

    /// Drop the entry for a job that reached a terminal status.
    pub fn clear(&self, id: &GenerationId) {
        let mut entries = self.entries.write().unwrap();
        entries.remove(id);
    }

    /// Sweep entries not written within `ttl`. Returns the number removed.
    pub fn prune_stale(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, update| update.updated_at >= cutoff);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProgressStep;

    #[test]
    fn record_overwrites_and_clear_removes() {
        let cache = ProgressCache::new();
        let id = GenerationId::generate();

        cache.record(&id, ProgressUpdate::new(ProgressStep::Outline, "outlining", 10));
        cache.record(&id, ProgressUpdate::new(ProgressStep::Lessons, "writing lessons", 60));

        let update = cache.get(&id).unwrap();
        assert_eq!(update.step, ProgressStep::Lessons);
        assert_eq!(update.percent, 60);

        cache.clear(&id);
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn percent_is_clamped() {
        let update = ProgressUpdate::new(ProgressStep::Complete, "done", 150);
        assert_eq!(update.percent, 100);
    }

    #[test]
    fn prune_drops_stale_entries_only() {
        let cache = ProgressCache::new();
        let stale = GenerationId::generate();
        let fresh = GenerationId::generate();

        let mut old = ProgressUpdate::new(ProgressStep::Outline, "stuck", 5);
        old.updated_at = Utc::now() - chrono::Duration::hours(2);
        cache.record(&stale, old);
        cache.record(&fresh, ProgressUpdate::new(ProgressStep::Lessons, "writing", 50));

        let removed = cache.prune_stale(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(cache.get(&stale).is_none());
        assert!(cache.get(&fresh).is_some());
    }
}
