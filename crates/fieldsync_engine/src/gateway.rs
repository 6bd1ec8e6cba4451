//! Remote gateway abstraction.

use crate::error::{SyncError, SyncResult};
use fieldsync_model::{ActionId, ActionKind, PendingAction, RemoteEntity, ServerId, VersionStamp};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Executes one mutation per pending action against the backend.
///
/// Implementations wrap whatever transport the app uses; the engine only
/// needs the outcome. The action's id travels with the request as the
/// idempotency token, and the gateway must honor it for `Create`: replaying
/// a create whose acknowledgement was lost returns the already-created
/// entity instead of making a second one. Actions with `force` set must
/// overwrite the remote version check.
pub trait RemoteGateway: Send + Sync {
    /// Executes one action, returning the server's resulting entity.
    fn execute(&self, action: &PendingAction) -> SyncResult<RemoteEntity>;
}

/// One scripted response for [`MockGateway`].
#[derive(Debug, Clone)]
pub enum GatewayScript {
    /// Handle the call normally against the in-memory server state.
    Succeed,
    /// Fail with a network error.
    Network,
    /// Fail with an authentication error.
    Auth,
    /// Fail with a validation error carrying this message.
    Validation(String),
    /// Fail with a server error.
    Server,
    /// Fail with a version conflict carrying this remote entity.
    Conflict(RemoteEntity),
}

#[derive(Default)]
struct GatewayState {
    entities: HashMap<ServerId, RemoteEntity>,
    completed: HashMap<ActionId, RemoteEntity>,
    scripts: HashMap<ActionId, VecDeque<GatewayScript>>,
    global_scripts: VecDeque<GatewayScript>,
    calls: Vec<ActionId>,
    next_id: u64,
}

/// An in-memory gateway for tests.
///
/// Behaves like a small server: creates assign sequential `srv_{n}` ids,
/// updates bump the version stamp, deletes produce tombstones, and repeated
/// calls with the same action id return the first result (idempotency).
/// Failures are injected by scripting responses per action id or globally;
/// scripted entries are consumed in order before normal handling resumes.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    /// Creates an empty mock gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the fake server with an existing entity.
    pub fn seed(&self, remote: RemoteEntity) {
        let mut state = self.state.lock();
        state.entities.insert(remote.id.clone(), remote);
    }

    /// Scripts responses for one action, consumed in order.
    pub fn script(&self, action: ActionId, scripts: impl IntoIterator<Item = GatewayScript>) {
        let mut state = self.state.lock();
        state.scripts.entry(action).or_default().extend(scripts);
    }

    /// Scripts a response for the next call regardless of action.
    pub fn script_next(&self, script: GatewayScript) {
        self.state.lock().global_scripts.push_back(script);
    }

    /// Returns every executed action id in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<ActionId> {
        self.state.lock().calls.clone()
    }

    /// Returns how many times one action was executed.
    #[must_use]
    pub fn call_count(&self, action: ActionId) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == action).count()
    }

    /// Returns the fake server's copy of an entity.
    #[must_use]
    pub fn entity(&self, id: &ServerId) -> Option<RemoteEntity> {
        self.state.lock().entities.get(id).cloned()
    }

    /// Returns how many entities the fake server holds.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.state.lock().entities.len()
    }
}

fn require_server_id(action: &PendingAction) -> SyncResult<ServerId> {
    match action.resource_id.as_server() {
        Some(id) => Ok(id.clone()),
        None => Err(SyncError::validation("resource id was never remapped")),
    }
}

impl RemoteGateway for MockGateway {
    fn execute(&self, action: &PendingAction) -> SyncResult<RemoteEntity> {
        let mut state = self.state.lock();
        state.calls.push(action.id);

        let script = match state
            .scripts
            .get_mut(&action.id)
            .and_then(VecDeque::pop_front)
        {
            Some(script) => Some(script),
            None => state.global_scripts.pop_front(),
        };
        if let Some(script) = script {
            match script {
                GatewayScript::Succeed => {}
                GatewayScript::Network => {
                    return Err(SyncError::network("scripted network failure"));
                }
                GatewayScript::Auth => return Err(SyncError::auth("scripted auth failure")),
                GatewayScript::Validation(message) => {
                    return Err(SyncError::Validation { message });
                }
                GatewayScript::Server => return Err(SyncError::server("scripted server failure")),
                GatewayScript::Conflict(remote) => return Err(SyncError::conflict(remote)),
            }
        }

        if let Some(done) = state.completed.get(&action.id) {
            return Ok(done.clone());
        }

        let result = match action.kind {
            ActionKind::Create => {
                state.next_id += 1;
                let id = ServerId::new(format!("srv_{}", state.next_id));
                let entity = RemoteEntity::new(
                    id,
                    action.entity_kind,
                    VersionStamp::new(1),
                    action.payload.clone(),
                );
                state.entities.insert(entity.id.clone(), entity.clone());
                entity
            }
            ActionKind::Update | ActionKind::Transition => {
                let id = require_server_id(action)?;
                // Lenient: updating an entity the fake never saw creates it
                let version = state
                    .entities
                    .get(&id)
                    .map_or(VersionStamp::new(1), |e| e.version.next());
                let entity = RemoteEntity::new(
                    id.clone(),
                    action.entity_kind,
                    version,
                    action.payload.clone(),
                );
                state.entities.insert(id, entity.clone());
                entity
            }
            ActionKind::Delete => {
                let id = require_server_id(action)?;
                let version = state
                    .entities
                    .remove(&id)
                    .map_or(VersionStamp::new(1), |e| e.version.next());
                RemoteEntity::tombstone(id, action.entity_kind, version)
            }
        };

        state.completed.insert(action.id, result.clone());
        Ok(result)
    }
}
