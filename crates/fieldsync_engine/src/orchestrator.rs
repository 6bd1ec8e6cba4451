//! The drain cycle: queue to gateway to queue/cache.

use crate::clock::{CancelToken, Clock};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::resolver::resolve;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::status::StatusFeed;
use fieldsync_model::{
    ActionId, ActionKind, ActionStatus, EntityKind, ManualChoice, MirrorEntity, Payload,
    PendingAction, RemoteEntity, ResolutionOutcome, ResourceId, SyncState,
};
use fieldsync_store::{ActionQueue, MirrorCache, StoreError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What one drain cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Gateway calls made.
    pub executed: usize,
    /// Actions confirmed and removed.
    pub synced: usize,
    /// Actions rescheduled with backoff.
    pub retried: usize,
    /// Actions that hit terminal failure.
    pub failed: usize,
    /// Conflicts parked for manual resolution.
    pub conflicts: usize,
    /// Conflicts resolved automatically.
    pub resolved: usize,
    /// True if an auth failure halted the engine mid-drain.
    pub halted: bool,
}

/// Coordinates the queue, cache, and gateway into one sync pipeline.
///
/// The orchestrator holds no durable state of its own: everything it
/// needs to resume after a crash is in the [`ActionQueue`] and
/// [`MirrorCache`]. Collaborators are injected, so tests run the whole
/// pipeline against [`MockGateway`](crate::MockGateway) and
/// [`ManualClock`](crate::ManualClock) with no network or timers.
///
/// A drain cycle repeatedly dequeues a batch of eligible actions (at most
/// one per resource, at most `max_in_flight` overall), executes them
/// concurrently through the gateway, and applies the outcomes serially:
///
/// - success confirms the cache entry and removes the action; a create
///   additionally remaps the local id to the server id across the queue
///   and cache before anything is removed, so a crash mid-sequence replays
///   the create idempotently instead of losing it
/// - a version conflict runs the resolver; automatic outcomes re-enqueue
///   a replacement and consume the original, manual ones park the action
/// - network and server errors reschedule with exponential backoff until
///   the attempt budget is spent, then fail
/// - validation errors fail immediately
/// - an auth error returns the action to pending untouched and halts every
///   dispatch until [`notify_authenticated`](Self::notify_authenticated)
///
/// Only one drain runs at a time; a second caller gets an empty report.
/// Going offline or cancelling stops new dispatches but lets in-flight
/// calls finish and their outcomes apply.
pub struct SyncOrchestrator<G: RemoteGateway, C: Clock> {
    queue: Arc<ActionQueue>,
    cache: Arc<MirrorCache>,
    gateway: Arc<G>,
    clock: Arc<C>,
    connectivity: Arc<ConnectivityMonitor>,
    config: SyncConfig,
    status: StatusFeed,
    stats: EngineStats,
    draining: Mutex<()>,
    drain_active: AtomicBool,
    auth_halted: AtomicBool,
    cancel: CancelToken,
    last_sync_at: RwLock<Option<u64>>,
}

impl<G: RemoteGateway, C: Clock> SyncOrchestrator<G, C> {
    /// Creates an orchestrator over the given collaborators.
    pub fn new(
        queue: Arc<ActionQueue>,
        cache: Arc<MirrorCache>,
        gateway: Arc<G>,
        clock: Arc<C>,
        connectivity: Arc<ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            cache,
            gateway,
            clock,
            connectivity,
            config,
            status: StatusFeed::new(),
            stats: EngineStats::new(),
            draining: Mutex::new(()),
            drain_active: AtomicBool::new(false),
            auth_halted: AtomicBool::new(false),
            cancel: CancelToken::new(),
            last_sync_at: RwLock::new(None),
        }
    }

    /// Queues a mutation and projects it into the cache in one step.
    ///
    /// The action is journaled first; the optimistic cache write follows so
    /// screens show the edit immediately. Deletes skip the projection (the
    /// mirror entry goes away when the server confirms).
    ///
    /// Returns the new action's id.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn submit(
        &self,
        kind: ActionKind,
        entity_kind: EntityKind,
        resource_id: ResourceId,
        payload: Payload,
        priority: i32,
    ) -> SyncResult<ActionId> {
        let now = self.clock.now_millis();
        let action = PendingAction::new(
            kind,
            entity_kind,
            resource_id.clone(),
            payload.clone(),
            priority,
            now,
        );
        let id = self.queue.enqueue(action)?;
        if kind != ActionKind::Delete {
            self.cache.apply_local(&resource_id, entity_kind, payload, now)?;
        }
        self.publish_status();
        tracing::debug!(action = %id, %kind, %resource_id, "action submitted");
        Ok(id)
    }

    /// Queues a creation, allocating the provisional local id.
    ///
    /// Returns the action id and the local resource id the entity lives
    /// under until the server assigns a real one.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn submit_create(
        &self,
        entity_kind: EntityKind,
        payload: Payload,
        priority: i32,
    ) -> SyncResult<(ActionId, ResourceId)> {
        let resource_id = ResourceId::new_local();
        let id = self.submit(
            ActionKind::Create,
            entity_kind,
            resource_id.clone(),
            payload,
            priority,
        )?;
        Ok((id, resource_id))
    }

    /// Runs a drain cycle until the queue has nothing eligible.
    ///
    /// Returns an empty report immediately if another drain is already
    /// running, and stops early when offline, auth-halted, or cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only for store failures; gateway failures are
    /// outcomes, not errors, and land in the report.
    pub fn drain(&self) -> SyncResult<DrainReport> {
        let Some(_serial) = self.draining.try_lock() else {
            tracing::debug!("drain already running");
            return Ok(DrainReport::default());
        };

        let mut report = DrainReport::default();
        let flag = DrainFlag::raise(&self.drain_active);
        let result = self.drain_loop(&mut report);
        drop(flag);

        if report.synced > 0 {
            *self.last_sync_at.write() = Some(self.clock.now_millis());
        }
        self.stats.record_drain();
        self.publish_status();
        tracing::debug!(
            executed = report.executed,
            synced = report.synced,
            retried = report.retried,
            failed = report.failed,
            conflicts = report.conflicts,
            resolved = report.resolved,
            "drain finished"
        );
        result.map(|()| report)
    }

    /// Triggers an immediate drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the drain hits a store failure.
    pub fn sync_now(&self) -> SyncResult<DrainReport> {
        self.drain()
    }

    /// Resets every failed action for a fresh round of attempts.
    ///
    /// Returns how many were reset. The reset actions dispatch on the next
    /// drain; call [`sync_now`](Self::sync_now) to run one immediately (the
    /// supervisor does this itself).
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn retry_failed(&self) -> SyncResult<usize> {
        let reset = self.queue.retry_failed()?;
        if reset > 0 {
            tracing::info!(reset, "failed actions queued for retry");
            self.publish_status();
        }
        Ok(reset)
    }

    /// Discards every failed action. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn clear_failed(&self) -> SyncResult<usize> {
        let cleared = self.queue.clear_failed()?;
        if cleared > 0 {
            tracing::info!(cleared, "failed actions discarded");
            self.publish_status();
        }
        Ok(cleared)
    }

    /// Applies the user's choice to an action parked in conflict.
    ///
    /// `AcceptRemote` writes the server's entity into the cache and drops
    /// the action, returning `None`. `ForceLocal` re-queues the local
    /// payload as a new forced action and returns its id; it dispatches on
    /// the next drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is missing, is not in conflict, or a
    /// journal write fails.
    pub fn resolve_conflict(
        &self,
        id: ActionId,
        choice: ManualChoice,
    ) -> SyncResult<Option<ActionId>> {
        let action = self
            .queue
            .get(id)
            .ok_or(StoreError::ActionNotFound { id })?;
        let remote = match (action.status, action.remote_snapshot.clone()) {
            (ActionStatus::Conflict, Some(remote)) => remote,
            _ => {
                return Err(SyncError::Store(StoreError::InvalidTransition {
                    id,
                    from: action.status,
                    to: ActionStatus::Syncing,
                }));
            }
        };

        let now = self.clock.now_millis();
        let replacement = match choice {
            ManualChoice::AcceptRemote => {
                let resource = ResourceId::Server(remote.id.clone());
                let still_pending = self.queue.has_other_actions(&resource, id);
                let dispatched_at = action.last_attempt_at.unwrap_or(now);
                self.cache.confirm(&remote, still_pending, dispatched_at, now)?;
                self.queue.remove(id)?;
                tracing::info!(action = %id, "conflict resolved keeping remote");
                None
            }
            ManualChoice::ForceLocal => {
                let forced = PendingAction::new(
                    action.kind,
                    action.entity_kind,
                    action.resource_id.clone(),
                    action.payload.clone(),
                    action.priority,
                    now,
                )
                .with_force();
                let new_id = self.queue.enqueue(forced)?;
                self.queue.remove(id)?;
                tracing::info!(action = %id, replacement = %new_id, "conflict resolved keeping local");
                Some(new_id)
            }
        };
        self.publish_status();
        Ok(replacement)
    }

    /// Clears the auth halt after the app re-authenticates.
    pub fn notify_authenticated(&self) {
        if self.auth_halted.swap(false, Ordering::SeqCst) {
            tracing::info!("authentication restored, sync resumed");
            self.publish_status();
        }
    }

    /// Returns true while an auth failure is blocking all dispatches.
    #[must_use]
    pub fn halted(&self) -> bool {
        self.auth_halted.load(Ordering::SeqCst)
    }

    /// Returns true if the connectivity monitor reports online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Returns the connectivity monitor dispatches are gated on.
    #[must_use]
    pub fn connectivity(&self) -> Arc<ConnectivityMonitor> {
        Arc::clone(&self.connectivity)
    }

    /// Stops new dispatches. In-flight calls finish and their outcomes
    /// apply.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns a clone of the engine's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Returns the status feed UI observers subscribe to.
    #[must_use]
    pub fn status(&self) -> &StatusFeed {
        &self.status
    }

    /// Returns a snapshot of the engine counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns how long until the earliest backoff schedule comes due.
    ///
    /// `None` means nothing is waiting on a schedule; `Some(ZERO)` means an
    /// action is already due.
    #[must_use]
    pub fn next_wake_delay(&self) -> Option<Duration> {
        let next = self.queue.next_attempt_at()?;
        let now = self.clock.now_millis();
        Some(Duration::from_millis(next.saturating_sub(now)))
    }

    fn drain_loop(&self, report: &mut DrainReport) -> SyncResult<()> {
        let limit = self.config.batch_size.min(self.config.max_in_flight).max(1);

        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!("drain stopped: engine cancelled");
                return Ok(());
            }
            if !self.connectivity.is_online() {
                tracing::debug!("drain stopped: offline");
                return Ok(());
            }
            if self.auth_halted.load(Ordering::SeqCst) {
                tracing::debug!("drain stopped: awaiting re-authentication");
                return Ok(());
            }

            let now = self.clock.now_millis();
            let batch = self.queue.dequeue_batch(limit, &HashSet::new(), now);
            if batch.is_empty() {
                return Ok(());
            }

            let mut in_flight = Vec::with_capacity(batch.len());
            for action in batch {
                match self.queue.mark_syncing(action.id) {
                    Ok(()) => in_flight.push(action),
                    // Leftover in-flight marker; the action stays Pending
                    Err(StoreError::ResourceBusy { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            if in_flight.is_empty() {
                continue;
            }
            self.publish_status();

            for (action, dispatched_at, result) in self.execute_batch(in_flight) {
                report.executed += 1;
                self.apply_outcome(&action, dispatched_at, result, report)?;
            }
            self.publish_status();
        }
    }

    /// Executes one batch through the gateway, one scoped thread per
    /// action. The batch never holds two actions for the same resource, so
    /// the calls cannot race each other on the server side.
    fn execute_batch(
        &self,
        batch: Vec<PendingAction>,
    ) -> Vec<(PendingAction, u64, SyncResult<RemoteEntity>)> {
        let gateway = &self.gateway;
        let cancel = &self.cancel;
        let dispatched_at = self.clock.now_millis();

        std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .into_iter()
                .map(|action| {
                    scope.spawn(move || {
                        if cancel.is_cancelled() {
                            return (action, dispatched_at, Err(SyncError::Cancelled));
                        }
                        let result = gateway.execute(&action);
                        (action, dispatched_at, result)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    fn apply_outcome(
        &self,
        action: &PendingAction,
        dispatched_at: u64,
        result: SyncResult<RemoteEntity>,
        report: &mut DrainReport,
    ) -> SyncResult<()> {
        let now = self.clock.now_millis();
        match result {
            Ok(remote) => self.apply_success(action, dispatched_at, &remote, report),
            Err(SyncError::Conflict(remote)) => {
                self.apply_conflict(action, dispatched_at, *remote, report)
            }
            Err(SyncError::Cancelled) => {
                self.queue.repend(action.id, now)?;
                Ok(())
            }
            Err(err) if err.is_auth() => {
                self.auth_halted.store(true, Ordering::SeqCst);
                self.queue.repend(action.id, now)?;
                report.halted = true;
                tracing::warn!(
                    action = %action.id,
                    error = %err,
                    "sync halted pending re-authentication"
                );
                Ok(())
            }
            Err(err) if err.is_retryable() => {
                let attempt = action.retry_count + 1;
                if attempt >= self.config.retry.max_attempts {
                    self.queue.mark_failed(action.id, &err.to_string(), now)?;
                    self.stats.record_failed();
                    report.failed += 1;
                    tracing::warn!(
                        action = %action.id,
                        attempts = attempt,
                        error = %err,
                        "action failed, retries exhausted"
                    );
                } else {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    let next_attempt_at = now + millis(delay);
                    self.queue
                        .mark_retrying(action.id, &err.to_string(), now, next_attempt_at)?;
                    self.stats.record_retry_scheduled();
                    report.retried += 1;
                    tracing::debug!(
                        action = %action.id,
                        attempt,
                        delay_ms = millis(delay),
                        "retry scheduled"
                    );
                }
                Ok(())
            }
            Err(err) => {
                self.queue.mark_failed(action.id, &err.to_string(), now)?;
                self.stats.record_failed();
                report.failed += 1;
                tracing::warn!(action = %action.id, error = %err, "action rejected");
                Ok(())
            }
        }
    }

    fn apply_success(
        &self,
        action: &PendingAction,
        dispatched_at: u64,
        remote: &RemoteEntity,
        report: &mut DrainReport,
    ) -> SyncResult<()> {
        let now = self.clock.now_millis();
        let server = ResourceId::Server(remote.id.clone());

        if action.kind.is_create() && action.resource_id.is_local() {
            // Remap before removing anything: replaying this create after a
            // crash is idempotent, losing the id mapping is not
            self.queue.remap_resource(&action.resource_id, &server)?;
            match self.cache.remap_id(&action.resource_id, &server) {
                Ok(()) => {}
                // Nothing was cached under the local id
                Err(StoreError::EntityNotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
            tracing::info!(local = %action.resource_id, server = %server, "created entity remapped");
        }

        let still_pending = self.queue.has_other_actions(&server, action.id);
        self.cache.confirm(remote, still_pending, dispatched_at, now)?;
        self.queue.mark_synced(action.id)?;
        self.stats.record_synced();
        report.synced += 1;
        tracing::debug!(action = %action.id, entity = %remote.id, "action synced");
        Ok(())
    }

    fn apply_conflict(
        &self,
        action: &PendingAction,
        dispatched_at: u64,
        remote: RemoteEntity,
        report: &mut DrainReport,
    ) -> SyncResult<()> {
        self.stats.record_conflict_detected();
        let now = self.clock.now_millis();
        let policy = self.config.policies.policy_for(action.entity_kind);
        let rules = self.config.merge_rules_for(action.entity_kind);
        tracing::info!(
            action = %action.id,
            entity = %remote.id,
            ?policy,
            "version conflict detected"
        );

        match resolve(&action.payload, &remote, policy, &rules) {
            ResolutionOutcome::AcceptRemote => {
                let resource = ResourceId::Server(remote.id.clone());
                let still_pending = self.queue.has_other_actions(&resource, action.id);
                self.cache.confirm(&remote, still_pending, dispatched_at, now)?;
                self.queue.remove(action.id)?;
                self.stats.record_conflict_auto_resolved();
                report.resolved += 1;
                tracing::debug!(action = %action.id, "conflict resolved keeping remote");
            }
            ResolutionOutcome::ForceLocal => {
                let forced = PendingAction::new(
                    action.kind,
                    action.entity_kind,
                    action.resource_id.clone(),
                    action.payload.clone(),
                    action.priority,
                    now,
                )
                .with_force();
                self.queue.enqueue(forced)?;
                self.queue.remove(action.id)?;
                self.stats.record_conflict_auto_resolved();
                report.resolved += 1;
                tracing::debug!(action = %action.id, "conflict resolved keeping local");
            }
            ResolutionOutcome::Merge(merged) => {
                let replacement = PendingAction::new(
                    ActionKind::Update,
                    action.entity_kind,
                    action.resource_id.clone(),
                    merged.clone(),
                    action.priority,
                    now,
                );
                self.queue.enqueue(replacement)?;
                self.queue.remove(action.id)?;
                self.cache.upsert(MirrorEntity {
                    resource_id: action.resource_id.clone(),
                    entity_kind: action.entity_kind,
                    version: Some(remote.version),
                    body: merged,
                    pending_sync: true,
                    updated_at: now,
                })?;
                self.stats.record_conflict_auto_resolved();
                report.resolved += 1;
                tracing::debug!(action = %action.id, "conflict merged, replacement queued");
            }
            ResolutionOutcome::RequireManualChoice { .. } => {
                self.queue.mark_conflict(action.id, remote, now)?;
                report.conflicts += 1;
                tracing::info!(action = %action.id, "conflict parked for manual resolution");
            }
        }
        Ok(())
    }

    fn publish_status(&self) {
        let counts = self.queue.counts();
        let is_syncing = self.drain_active.load(Ordering::SeqCst) || counts.syncing > 0;
        let state = SyncState::from_counts(counts, is_syncing, *self.last_sync_at.read());
        self.status.publish(state);
    }
}

impl<G: RemoteGateway, C: Clock> std::fmt::Debug for SyncOrchestrator<G, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("queued", &self.queue.len())
            .field("halted", &self.halted())
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Keeps `drain_active` true for exactly the lifetime of the loop, store
/// errors included.
struct DrainFlag<'a>(&'a AtomicBool);

impl<'a> DrainFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
