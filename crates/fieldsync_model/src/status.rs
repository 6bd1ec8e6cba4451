//! Aggregate sync status published to UI observers.

use serde::{Deserialize, Serialize};

/// Queue occupancy by status.
///
/// Produced by the durable queue; `synced` has no counter because synced
/// actions are removed rather than retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Actions waiting to drain.
    pub pending: usize,
    /// Actions currently at the gateway.
    pub syncing: usize,
    /// Terminal failures awaiting user action.
    pub failed: usize,
    /// Actions parked on unresolved conflicts.
    pub conflict: usize,
}

impl StatusCounts {
    /// Total records currently in the queue.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.syncing + self.failed + self.conflict
    }
}

/// Aggregate sync status snapshot.
///
/// Published by the orchestrator after every drain cycle and after every
/// status transition; UI layers subscribe read-only and render badges from
/// it. Failed and conflicted work stays visible here until the user acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Actions waiting to drain (includes those in backoff).
    pub pending_count: usize,
    /// Terminal failures awaiting user action.
    pub failed_count: usize,
    /// Conflicts awaiting a manual choice.
    pub conflict_count: usize,
    /// True while a drain cycle is running.
    pub is_syncing: bool,
    /// Unix-epoch milliseconds of the last completed drain, if any.
    pub last_sync_at: Option<u64>,
}

impl SyncState {
    /// Builds a snapshot from queue counts plus orchestrator state.
    #[must_use]
    pub fn from_counts(counts: StatusCounts, is_syncing: bool, last_sync_at: Option<u64>) -> Self {
        Self {
            pending_count: counts.pending + counts.syncing,
            failed_count: counts.failed,
            conflict_count: counts.conflict,
            is_syncing,
            last_sync_at,
        }
    }

    /// Returns true if nothing is queued, failed, conflicted, or in flight.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pending_count == 0
            && self.failed_count == 0
            && self.conflict_count == 0
            && !self.is_syncing
    }

    /// Returns true if anything needs user attention.
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        self.failed_count > 0 || self.conflict_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_total() {
        let counts = StatusCounts {
            pending: 2,
            syncing: 1,
            failed: 3,
            conflict: 1,
        };
        assert_eq!(counts.total(), 7);
    }

    #[test]
    fn in_flight_actions_still_count_as_pending() {
        let counts = StatusCounts {
            pending: 2,
            syncing: 1,
            ..StatusCounts::default()
        };
        let state = SyncState::from_counts(counts, true, None);
        assert_eq!(state.pending_count, 3);
        assert!(state.is_syncing);
    }

    #[test]
    fn settled_state() {
        let state = SyncState::from_counts(StatusCounts::default(), false, Some(10));
        assert!(state.is_settled());
        assert!(!state.needs_attention());
    }

    #[test]
    fn failures_need_attention() {
        let counts = StatusCounts {
            failed: 1,
            ..StatusCounts::default()
        };
        let state = SyncState::from_counts(counts, false, None);
        assert!(!state.is_settled());
        assert!(state.needs_attention());
    }
}
