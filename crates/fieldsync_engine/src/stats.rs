//! Engine counters for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters tracking what the engine has done.
///
/// All counters are atomic and readable while a drain is running. These
/// are diagnostics, not the UI status: the authoritative queue occupancy
/// comes from [`SyncState`] snapshots.
///
/// [`SyncState`]: fieldsync_model::SyncState
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Actions confirmed and removed from the queue.
    synced: AtomicU64,
    /// Actions that hit terminal failure.
    failed: AtomicU64,
    /// Conflict signals returned by the gateway.
    conflicts_detected: AtomicU64,
    /// Conflicts resolved without user input.
    conflicts_auto_resolved: AtomicU64,
    /// Retry attempts scheduled with backoff.
    retries_scheduled: AtomicU64,
    /// Drain cycles run to completion.
    drains: AtomicU64,
}

impl EngineStats {
    /// Creates a zeroed stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_synced(&self) {
        self.synced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict_detected(&self) {
        self.conflicts_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict_auto_resolved(&self) {
        self.conflicts_auto_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of actions confirmed synced.
    #[must_use]
    pub fn synced(&self) -> u64 {
        self.synced.load(Ordering::Relaxed)
    }

    /// Returns the number of terminal failures.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Returns the number of conflicts the gateway reported.
    #[must_use]
    pub fn conflicts_detected(&self) -> u64 {
        self.conflicts_detected.load(Ordering::Relaxed)
    }

    /// Returns the number of conflicts resolved without user input.
    #[must_use]
    pub fn conflicts_auto_resolved(&self) -> u64 {
        self.conflicts_auto_resolved.load(Ordering::Relaxed)
    }

    /// Returns the number of retries scheduled.
    #[must_use]
    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::Relaxed)
    }

    /// Returns the number of completed drain cycles.
    #[must_use]
    pub fn drains(&self) -> u64 {
        self.drains.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            synced: self.synced(),
            failed: self.failed(),
            conflicts_detected: self.conflicts_detected(),
            conflicts_auto_resolved: self.conflicts_auto_resolved(),
            retries_scheduled: self.retries_scheduled(),
            drains: self.drains(),
        }
    }
}

/// A point-in-time snapshot of [`EngineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Actions confirmed and removed from the queue.
    pub synced: u64,
    /// Actions that hit terminal failure.
    pub failed: u64,
    /// Conflict signals returned by the gateway.
    pub conflicts_detected: u64,
    /// Conflicts resolved without user input.
    pub conflicts_auto_resolved: u64,
    /// Retry attempts scheduled with backoff.
    pub retries_scheduled: u64,
    /// Drain cycles run to completion.
    pub drains: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = EngineStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn records_accumulate() {
        let stats = EngineStats::new();
        stats.record_synced();
        stats.record_synced();
        stats.record_retry_scheduled();
        stats.record_conflict_detected();
        stats.record_conflict_auto_resolved();
        stats.record_drain();

        let snap = stats.snapshot();
        assert_eq!(snap.synced, 2);
        assert_eq!(snap.retries_scheduled, 1);
        assert_eq!(snap.conflicts_detected, 1);
        assert_eq!(snap.conflicts_auto_resolved, 1);
        assert_eq!(snap.drains, 1);
        assert_eq!(snap.failed, 0);
    }
}
