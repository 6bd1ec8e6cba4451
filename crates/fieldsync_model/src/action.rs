//! Pending actions and their lifecycle.

use crate::entity::{EntityKind, RemoteEntity};
use crate::id::{ActionId, ResourceId};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The mutation catalogue.
///
/// Closed on purpose: a new mutation kind must be added here, which forces
/// every dispatch site to handle it at compile time. Kinds are never
/// compared as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Create a new entity (resource id starts local).
    Create,
    /// Update an existing entity.
    Update,
    /// Transition an entity's workflow status (e.g. submit a daily log).
    Transition,
    /// Delete an entity.
    Delete,
}

impl ActionKind {
    /// Returns true for creation actions, which need id remapping on success.
    #[must_use]
    pub fn is_create(&self) -> bool {
        matches!(self, ActionKind::Create)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Transition => "transition",
            ActionKind::Delete => "delete",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle status of a pending action.
///
/// Transitions: `Pending → Syncing → {Synced | Failed | Conflict}`;
/// `Failed → Pending` on retry; `Conflict → Pending` after resolution.
/// `Synced` is terminal and the record is removed from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Queued, waiting for a drain cycle.
    Pending,
    /// Handed to the remote gateway; at most one per resource.
    Syncing,
    /// Confirmed by the server (transient: the record is removed).
    Synced,
    /// Terminal failure awaiting user action.
    Failed,
    /// Parked on an unresolved conflict awaiting a manual choice.
    Conflict,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Syncing => "syncing",
            ActionStatus::Synced => "synced",
            ActionStatus::Failed => "failed",
            ActionStatus::Conflict => "conflict",
        };
        write!(f, "{name}")
    }
}

/// A queued, not-yet-confirmed local mutation.
///
/// The durable queue exclusively owns the lifetime of these records: they
/// are created by `enqueue`, mutated only through the queue's transition
/// methods, and removed only on sync confirmation or explicit user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Stable identity, generated at enqueue; the gateway idempotency token.
    pub id: ActionId,
    /// What mutation this is.
    pub kind: ActionKind,
    /// Domain kind of the targeted entity.
    pub entity_kind: EntityKind,
    /// The targeted entity (local id until a creation remaps it).
    pub resource_id: ResourceId,
    /// Opaque mutation body.
    pub payload: Payload,
    /// Lifecycle status.
    pub status: ActionStatus,
    /// Higher priority drains first.
    pub priority: i32,
    /// Attempts made so far; resets only on explicit user retry.
    pub retry_count: u32,
    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Unix-epoch milliseconds at enqueue.
    pub created_at: u64,
    /// Unix-epoch milliseconds of the most recent attempt.
    pub last_attempt_at: Option<u64>,
    /// Earliest time the action is eligible to drain again (backoff).
    pub next_attempt_at: Option<u64>,
    /// True if the gateway must overwrite the remote version check.
    pub force: bool,
    /// Remote side of an unresolved conflict, kept for the manual choice UI.
    pub remote_snapshot: Option<RemoteEntity>,
}

impl PendingAction {
    /// Creates a new pending action.
    #[must_use]
    pub fn new(
        kind: ActionKind,
        entity_kind: EntityKind,
        resource_id: ResourceId,
        payload: Payload,
        priority: i32,
        now: u64,
    ) -> Self {
        Self {
            id: ActionId::new(),
            kind,
            entity_kind,
            resource_id,
            payload,
            status: ActionStatus::Pending,
            priority,
            retry_count: 0,
            last_error: None,
            created_at: now,
            last_attempt_at: None,
            next_attempt_at: None,
            force: false,
            remote_snapshot: None,
        }
    }

    /// Marks the action as forced, bypassing the remote version check.
    ///
    /// Set on actions re-submitted by a `ForceLocal` resolution.
    #[must_use]
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Returns true if the action is eligible for a drain at `now`.
    ///
    /// Only `Pending` actions are eligible, and only once any scheduled
    /// backoff delay has elapsed.
    #[must_use]
    pub fn is_due(&self, now: u64) -> bool {
        self.status == ActionStatus::Pending && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}
