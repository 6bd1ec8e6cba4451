//! The durable pending-action queue.

use crate::backend::StoreBackend;
use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, JOURNAL_TAG_QUEUE};
use fieldsync_model::{
    ActionId, ActionStatus, PendingAction, RemoteEntity, ResourceId, StatusCounts,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One durable queue mutation.
///
/// Every status transition is exactly one record, so replaying the journal
/// in order rebuilds the queue as of the last completed write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueRecord {
    /// Insert or overwrite an action.
    Put(PendingAction),
    /// Remove an action.
    Remove(ActionId),
    /// Rewrite the resource id on every action referencing `from`.
    Remap {
        /// The id being retired (a local id after its creation synced).
        from: ResourceId,
        /// The server-assigned replacement.
        to: ResourceId,
    },
}

/// The durable, ordered store of pending mutations.
///
/// The queue exclusively owns [`PendingAction`] lifetimes: actions enter
/// through [`enqueue`](Self::enqueue), change state only through the
/// `mark_*` transitions, and leave only on sync confirmation, an explicit
/// [`clear_failed`](Self::clear_failed), or consumption by conflict
/// re-dispatch.
///
/// # Crash Safety
///
/// [`dequeue_batch`](Self::dequeue_batch) does not write; an action is
/// `Pending` on disk until `mark_syncing` journals the transition. A crash
/// between the two leaves it `Pending`. A crash after `mark_syncing` is
/// repaired on the next open, which demotes every `Syncing` action back to
/// `Pending`; the gateway's idempotency on the action id makes the retry
/// safe even if the interrupted call had reached the server.
pub struct ActionQueue {
    journal: Journal<QueueRecord>,
    actions: RwLock<HashMap<ActionId, PendingAction>>,
}

impl ActionQueue {
    /// Opens a queue over the given backend, replaying its journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal is corrupted (a torn tail is not
    /// corruption and is discarded silently).
    pub fn open(backend: Box<dyn StoreBackend>) -> StoreResult<Self> {
        let journal = Journal::new(backend, JOURNAL_TAG_QUEUE, true);
        let replay = journal.replay()?;

        if replay.trailing_bytes > 0 {
            tracing::warn!(
                trailing_bytes = replay.trailing_bytes,
                "discarding torn tail of queue journal"
            );
            // Rewrite so later appends don't land after the torn bytes
            journal.rewrite(&replay.records)?;
        }

        let mut actions: HashMap<ActionId, PendingAction> = HashMap::new();
        for record in replay.records {
            match record {
                QueueRecord::Put(action) => {
                    actions.insert(action.id, action);
                }
                QueueRecord::Remove(id) => {
                    actions.remove(&id);
                }
                QueueRecord::Remap { from, to } => {
                    for action in actions.values_mut() {
                        if action.resource_id == from {
                            action.resource_id = to.clone();
                        }
                    }
                }
            }
        }

        // An action found Syncing was in flight when the process died.
        // Its call either never completed or will be recognized by the
        // idempotency token on retry, so Pending is the safe state.
        let mut demoted = 0usize;
        for action in actions.values_mut() {
            if action.status == ActionStatus::Syncing {
                action.status = ActionStatus::Pending;
                demoted += 1;
            }
        }

        if demoted > 0 {
            tracing::info!(demoted, "demoted in-flight actions back to pending");
        }
        tracing::debug!(actions = actions.len(), "action queue opened");

        Ok(Self {
            journal,
            actions: RwLock::new(actions),
        })
    }

    /// Adds a freshly created action to the queue.
    ///
    /// Returns the action's id.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is not `Pending` or the journal
    /// write fails.
    pub fn enqueue(&self, action: PendingAction) -> StoreResult<ActionId> {
        if action.status != ActionStatus::Pending {
            return Err(StoreError::InvalidTransition {
                id: action.id,
                from: action.status,
                to: ActionStatus::Pending,
            });
        }

        let mut actions = self.actions.write();
        let id = action.id;
        self.journal.append(&QueueRecord::Put(action.clone()))?;
        actions.insert(id, action);

        tracing::debug!(action = %id, "action enqueued");
        Ok(id)
    }

    /// Returns the next batch of actions eligible to sync.
    ///
    /// Eligible means `Pending`, past any scheduled backoff delay, not
    /// targeting a resource in `exclude`, and not targeting a resource
    /// that already has an action `Syncing`. A non-create action still
    /// addressed to a local id is also held back: the server cannot
    /// resolve the id until the creation syncs and remaps it, so
    /// dispatching it early would fail an otherwise sound action. The
    /// batch is ordered by priority (descending), then age (oldest
    /// first), and contains at most one action per resource.
    ///
    /// Dequeuing writes nothing; actions stay `Pending` until
    /// [`mark_syncing`](Self::mark_syncing).
    #[must_use]
    pub fn dequeue_batch(
        &self,
        max: usize,
        exclude: &HashSet<ResourceId>,
        now: u64,
    ) -> Vec<PendingAction> {
        let actions = self.actions.read();

        let busy: HashSet<&ResourceId> = actions
            .values()
            .filter(|a| a.status == ActionStatus::Syncing)
            .map(|a| &a.resource_id)
            .collect();

        let mut eligible: Vec<&PendingAction> = actions
            .values()
            .filter(|a| a.is_due(now))
            .filter(|a| a.kind.is_create() || !a.resource_id.is_local())
            .filter(|a| !exclude.contains(&a.resource_id))
            .filter(|a| !busy.contains(&a.resource_id))
            .collect();

        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let mut batch = Vec::new();
        let mut taken: HashSet<&ResourceId> = HashSet::new();
        for action in eligible {
            if batch.len() == max {
                break;
            }
            if taken.insert(&action.resource_id) {
                batch.push(action.clone());
            }
        }
        batch
    }

    /// Transitions an action to `Syncing`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ResourceBusy`] if another action on the same
    /// resource is already `Syncing`, and [`StoreError::InvalidTransition`]
    /// unless the action is `Pending`, `Failed` (retry), or `Conflict`
    /// (post-resolution re-dispatch).
    pub fn mark_syncing(&self, id: ActionId) -> StoreResult<()> {
        let mut actions = self.actions.write();
        let action = actions
            .get(&id)
            .ok_or(StoreError::ActionNotFound { id })?;

        match action.status {
            ActionStatus::Pending | ActionStatus::Failed | ActionStatus::Conflict => {}
            from => {
                return Err(StoreError::InvalidTransition {
                    id,
                    from,
                    to: ActionStatus::Syncing,
                });
            }
        }

        let resource = action.resource_id.clone();
        let contended = actions
            .values()
            .any(|a| a.id != id && a.resource_id == resource && a.status == ActionStatus::Syncing);
        if contended {
            return Err(StoreError::ResourceBusy { resource });
        }

        let mut updated = action.clone();
        updated.status = ActionStatus::Syncing;
        self.journal.append(&QueueRecord::Put(updated.clone()))?;
        actions.insert(id, updated);
        Ok(())
    }

    /// Confirms an action and removes it from the queue.
    ///
    /// Returns the removed action. Synced actions are never retained.
    pub fn mark_synced(&self, id: ActionId) -> StoreResult<PendingAction> {
        let mut actions = self.actions.write();
        let action = actions
            .get(&id)
            .ok_or(StoreError::ActionNotFound { id })?;
        if action.status != ActionStatus::Syncing {
            return Err(StoreError::InvalidTransition {
                id,
                from: action.status,
                to: ActionStatus::Synced,
            });
        }

        self.journal.append(&QueueRecord::Remove(id))?;
        let removed = actions.remove(&id).ok_or(StoreError::ActionNotFound { id })?;

        tracing::debug!(action = %id, "action synced and removed");
        Ok(removed)
    }

    /// Records a retryable failure and schedules the next attempt.
    ///
    /// The action returns to `Pending` with `retry_count` incremented and
    /// becomes eligible again at `next_attempt_at`.
    pub fn mark_retrying(
        &self,
        id: ActionId,
        error: &str,
        now: u64,
        next_attempt_at: u64,
    ) -> StoreResult<()> {
        self.transition(id, ActionStatus::Pending, |action| {
            action.retry_count += 1;
            action.last_error = Some(error.to_owned());
            action.last_attempt_at = Some(now);
            action.next_attempt_at = Some(next_attempt_at);
        })
    }

    /// Records a terminal failure.
    ///
    /// The action stays in the queue as `Failed`, visible to the user,
    /// until an explicit retry or clear.
    pub fn mark_failed(&self, id: ActionId, error: &str, now: u64) -> StoreResult<()> {
        self.transition(id, ActionStatus::Failed, |action| {
            action.retry_count += 1;
            action.last_error = Some(error.to_owned());
            action.last_attempt_at = Some(now);
            action.next_attempt_at = None;
        })
    }

    /// Parks an action on an unresolved conflict.
    ///
    /// The remote snapshot is kept on the action so the UI can present
    /// both sides of the manual choice. Conflicts are not failures:
    /// `retry_count` is untouched.
    pub fn mark_conflict(&self, id: ActionId, remote: RemoteEntity, now: u64) -> StoreResult<()> {
        self.transition(id, ActionStatus::Conflict, move |action| {
            action.remote_snapshot = Some(remote);
            action.last_attempt_at = Some(now);
            action.next_attempt_at = None;
        })
    }

    /// Returns an in-flight action to `Pending` without consuming retry budget.
    ///
    /// Used when sync halts for re-authentication: the attempt was spent on
    /// a credentials problem, not on this action.
    pub fn repend(&self, id: ActionId, now: u64) -> StoreResult<()> {
        self.transition(id, ActionStatus::Pending, |action| {
            action.last_attempt_at = Some(now);
        })
    }

    /// Resets every `Failed` action to `Pending` for a fresh round of
    /// attempts. Returns how many were reset.
    ///
    /// This is the one place `retry_count` resets, matching the explicit
    /// user intent behind the call.
    pub fn retry_failed(&self) -> StoreResult<usize> {
        let mut actions = self.actions.write();
        let ids: Vec<ActionId> = actions
            .values()
            .filter(|a| a.status == ActionStatus::Failed)
            .map(|a| a.id)
            .collect();

        for id in &ids {
            if let Some(action) = actions.get(id) {
                let mut updated = action.clone();
                updated.status = ActionStatus::Pending;
                updated.retry_count = 0;
                updated.last_error = None;
                updated.next_attempt_at = None;
                self.journal.append(&QueueRecord::Put(updated.clone()))?;
                actions.insert(*id, updated);
            }
        }

        Ok(ids.len())
    }

    /// Removes every `Failed` action without resubmission. Returns how many
    /// were removed.
    pub fn clear_failed(&self) -> StoreResult<usize> {
        let mut actions = self.actions.write();
        let ids: Vec<ActionId> = actions
            .values()
            .filter(|a| a.status == ActionStatus::Failed)
            .map(|a| a.id)
            .collect();

        for id in &ids {
            self.journal.append(&QueueRecord::Remove(*id))?;
            actions.remove(id);
        }

        Ok(ids.len())
    }

    /// Removes an action consumed by conflict re-dispatch.
    ///
    /// The action's payload lives on in its replacement (or in the
    /// accepted remote entity), so this is not a deletion of user work.
    ///
    /// # Errors
    ///
    /// Returns an error unless the action is `Syncing` (auto-resolution
    /// mid-drain) or `Conflict` (manual resolution).
    pub fn remove(&self, id: ActionId) -> StoreResult<PendingAction> {
        let mut actions = self.actions.write();
        let action = actions
            .get(&id)
            .ok_or(StoreError::ActionNotFound { id })?;

        match action.status {
            ActionStatus::Syncing | ActionStatus::Conflict => {}
            from => {
                return Err(StoreError::InvalidTransition {
                    id,
                    from,
                    to: ActionStatus::Synced,
                });
            }
        }

        self.journal.append(&QueueRecord::Remove(id))?;
        actions.remove(&id).ok_or(StoreError::ActionNotFound { id })
    }

    /// Rewrites the resource id on every action referencing `from`.
    ///
    /// One durable record covers all affected actions, so the remap is
    /// atomic: after a crash, either every reference moved or none did.
    /// Returns how many actions were rewritten.
    pub fn remap_resource(&self, from: &ResourceId, to: &ResourceId) -> StoreResult<usize> {
        let mut actions = self.actions.write();
        let count = actions
            .values()
            .filter(|a| a.resource_id == *from)
            .count();
        if count == 0 {
            return Ok(0);
        }

        self.journal.append(&QueueRecord::Remap {
            from: from.clone(),
            to: to.clone(),
        })?;

        for action in actions.values_mut() {
            if action.resource_id == *from {
                action.resource_id = to.clone();
            }
        }

        tracing::debug!(%from, %to, count, "remapped queued actions");
        Ok(count)
    }

    /// Returns a copy of one action.
    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<PendingAction> {
        self.actions.read().get(&id).cloned()
    }

    /// Returns a snapshot of all actions in drain order.
    #[must_use]
    pub fn actions(&self) -> Vec<PendingAction> {
        let mut all: Vec<PendingAction> = self.actions.read().values().cloned().collect();
        all.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        all
    }

    /// Returns true if any other action still references this resource.
    ///
    /// Used when applying a confirmation: a resource with further queued
    /// work keeps its optimistic cache body.
    #[must_use]
    pub fn has_other_actions(&self, resource: &ResourceId, excluding: ActionId) -> bool {
        self.actions
            .read()
            .values()
            .any(|a| a.id != excluding && a.resource_id == *resource)
    }

    /// Returns queue occupancy by status.
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        let actions = self.actions.read();
        let mut counts = StatusCounts::default();
        for action in actions.values() {
            match action.status {
                ActionStatus::Pending => counts.pending += 1,
                ActionStatus::Syncing => counts.syncing += 1,
                ActionStatus::Failed => counts.failed += 1,
                ActionStatus::Conflict => counts.conflict += 1,
                // Synced actions are removed, never stored
                ActionStatus::Synced => {}
            }
        }
        counts
    }

    /// Returns the earliest scheduled retry time among pending actions.
    #[must_use]
    pub fn next_attempt_at(&self) -> Option<u64> {
        self.actions
            .read()
            .values()
            .filter(|a| a.status == ActionStatus::Pending)
            .filter_map(|a| a.next_attempt_at)
            .min()
    }

    /// Returns the number of actions in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    /// Returns true if the queue holds no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.read().is_empty()
    }

    /// Rewrites the journal to one `Put` per live action.
    pub fn compact(&self) -> StoreResult<()> {
        let actions = self.actions.write();
        let mut records: Vec<QueueRecord> =
            actions.values().cloned().map(QueueRecord::Put).collect();
        records.sort_by(|a, b| match (a, b) {
            (QueueRecord::Put(x), QueueRecord::Put(y)) => {
                x.created_at.cmp(&y.created_at).then(x.id.cmp(&y.id))
            }
            _ => std::cmp::Ordering::Equal,
        });
        self.journal.rewrite(&records)?;
        tracing::debug!(records = records.len(), "queue journal compacted");
        Ok(())
    }

    /// Moves a `Syncing` action to `to`, applying extra field updates.
    fn transition(
        &self,
        id: ActionId,
        to: ActionStatus,
        apply: impl FnOnce(&mut PendingAction),
    ) -> StoreResult<()> {
        let mut actions = self.actions.write();
        let action = actions
            .get(&id)
            .ok_or(StoreError::ActionNotFound { id })?;

        if action.status != ActionStatus::Syncing {
            return Err(StoreError::InvalidTransition {
                id,
                from: action.status,
                to,
            });
        }

        let mut updated = action.clone();
        updated.status = to;
        apply(&mut updated);
        self.journal.append(&QueueRecord::Put(updated.clone()))?;
        actions.insert(id, updated);
        Ok(())
    }
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
