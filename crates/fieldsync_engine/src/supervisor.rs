//! Background drain thread.

use crate::clock::Clock;
use crate::error::SyncResult;
use crate::gateway::RemoteGateway;
use crate::orchestrator::SyncOrchestrator;
use crate::status::StatusFeed;
use fieldsync_model::{ActionId, ActionKind, EntityKind, ManualChoice, Payload, ResourceId};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Pause before re-running a drain that failed on a store error.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

enum Wake {
    Drain,
    Shutdown,
}

/// Runs the orchestrator's drain cycle on a background thread.
///
/// The thread drains once at startup (picking up whatever the journals
/// replayed), then sleeps until something warrants a wake:
///
/// - a submission or manual trigger through this facade
/// - a connectivity transition back to online
/// - the earliest scheduled retry coming due
///
/// While offline or auth-halted it blocks indefinitely; the transition
/// callback and [`notify_authenticated`](Self::notify_authenticated) wake
/// it. All durable state lives in the stores, so the supervisor can be
/// stopped and restarted freely.
pub struct SyncSupervisor<G: RemoteGateway + 'static, C: Clock + 'static> {
    orchestrator: Arc<SyncOrchestrator<G, C>>,
    wake: Sender<Wake>,
    handle: Option<JoinHandle<()>>,
}

impl<G: RemoteGateway + 'static, C: Clock + 'static> SyncSupervisor<G, C> {
    /// Starts the background thread over an orchestrator.
    #[must_use]
    pub fn start(orchestrator: Arc<SyncOrchestrator<G, C>>) -> Self {
        let (wake, inbox) = mpsc::channel();

        let on_reconnect = wake.clone();
        orchestrator.connectivity().on_transition(move |from, to| {
            if !from.is_online() && to.is_online() {
                let _ = on_reconnect.send(Wake::Drain);
            }
        });

        let worker = Arc::clone(&orchestrator);
        let handle = std::thread::spawn(move || run(&worker, &inbox));

        Self {
            orchestrator,
            wake,
            handle: Some(handle),
        }
    }

    /// Queues a mutation and wakes the drain thread.
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
        let id = self
            .orchestrator
            .submit(kind, entity_kind, resource_id, payload, priority)?;
        self.request_drain();
        Ok(id)
    }

    /// Queues a creation and wakes the drain thread.
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
        let created = self.orchestrator.submit_create(entity_kind, payload, priority)?;
        self.request_drain();
        Ok(created)
    }

    /// Asks the drain thread to run a cycle now.
    ///
    /// Returns immediately; progress shows up on the status feed.
    pub fn sync_now(&self) {
        self.request_drain();
    }

    /// Resets failed actions and wakes the drain thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn retry_failed(&self) -> SyncResult<usize> {
        let reset = self.orchestrator.retry_failed()?;
        if reset > 0 {
            self.request_drain();
        }
        Ok(reset)
    }

    /// Discards failed actions. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn clear_failed(&self) -> SyncResult<usize> {
        self.orchestrator.clear_failed()
    }

    /// Applies a manual conflict choice, then wakes the drain thread so a
    /// forced replacement dispatches promptly.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is missing or not in conflict.
    pub fn resolve_conflict(
        &self,
        id: ActionId,
        choice: ManualChoice,
    ) -> SyncResult<Option<ActionId>> {
        let replacement = self.orchestrator.resolve_conflict(id, choice)?;
        if replacement.is_some() {
            self.request_drain();
        }
        Ok(replacement)
    }

    /// Clears the auth halt and wakes the drain thread.
    pub fn notify_authenticated(&self) {
        self.orchestrator.notify_authenticated();
        self.request_drain();
    }

    /// Returns the status feed UI observers subscribe to.
    #[must_use]
    pub fn status(&self) -> &StatusFeed {
        self.orchestrator.status()
    }

    /// Returns the orchestrator this supervisor drives.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator<G, C>> {
        &self.orchestrator
    }

    /// Stops the drain thread and waits for it.
    ///
    /// Cancellation is cooperative: an in-flight gateway call finishes and
    /// its outcome applies before the thread exits.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn request_drain(&self) {
        let _ = self.wake.send(Wake::Drain);
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.orchestrator.cancel();
        let _ = self.wake.send(Wake::Shutdown);
        if handle.join().is_err() {
            tracing::error!("sync supervisor thread panicked");
        }
    }
}

impl<G: RemoteGateway + 'static, C: Clock + 'static> Drop for SyncSupervisor<G, C> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<G: RemoteGateway + 'static, C: Clock + 'static> std::fmt::Debug for SyncSupervisor<G, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSupervisor")
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

fn run<G: RemoteGateway, C: Clock>(
    orchestrator: &SyncOrchestrator<G, C>,
    inbox: &Receiver<Wake>,
) {
    tracing::debug!("sync supervisor started");
    let mut error_backoff = drain_now(orchestrator);

    loop {
        let scheduled = if orchestrator.is_online() && !orchestrator.halted() {
            orchestrator.next_wake_delay()
        } else {
            None
        };
        let timeout = scheduled.map(|due| match error_backoff {
            Some(backoff) => due.max(backoff),
            None => due,
        });

        let message = match timeout {
            Some(delay) => match inbox.recv_timeout(delay) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => Some(Wake::Drain),
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => inbox.recv().ok(),
        };

        match message {
            Some(Wake::Drain) => error_backoff = drain_now(orchestrator),
            Some(Wake::Shutdown) | None => break,
        }
    }
    tracing::debug!("sync supervisor stopped");
}

fn drain_now<G: RemoteGateway, C: Clock>(
    orchestrator: &SyncOrchestrator<G, C>,
) -> Option<Duration> {
    if !orchestrator.is_online() || orchestrator.halted() {
        return None;
    }
    match orchestrator.drain() {
        Ok(_) => None,
        Err(err) => {
            tracing::error!(error = %err, "background drain failed");
            Some(ERROR_BACKOFF)
        }
    }
}
