//! Store fixtures and canned domain objects.
//!
//! Provides convenience constructors for the actions, entities, and
//! stores that sync tests set up over and over.

use fieldsync_model::{
    ActionKind, EntityKind, Payload, PendingAction, RemoteEntity, ResourceId, VersionStamp,
};
use fieldsync_store::Store;
use tempfile::TempDir;

/// A store over a temporary directory with automatic cleanup.
pub struct TestStore {
    /// The open store.
    pub store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestStore {
    /// Creates a fresh store in a temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory or store cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store =
            Store::open(&temp_dir.path().join("store"), true).expect("failed to open store");
        Self {
            store,
            _temp_dir: temp_dir,
        }
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test against a store in a temporary directory.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::new();
    f(&test_store.store)
}

/// A payload holding the given JSON value.
///
/// # Panics
///
/// Panics if the value cannot be serialized.
#[must_use]
pub fn json_payload(value: serde_json::Value) -> Payload {
    Payload::from_json(&value).expect("failed to encode payload")
}

/// A pending CREATE for a daily log under a fresh local id.
#[must_use]
pub fn daily_log_create(now: u64) -> PendingAction {
    PendingAction::new(
        ActionKind::Create,
        EntityKind::DailyLog,
        ResourceId::new_local(),
        json_payload(serde_json::json!({"crew": ["alice"], "notes": "poured slab"})),
        0,
        now,
    )
}

/// A pending UPDATE against the given resource.
#[must_use]
pub fn update_action(resource: &ResourceId, kind: EntityKind, now: u64) -> PendingAction {
    PendingAction::new(
        ActionKind::Update,
        kind,
        resource.clone(),
        json_payload(serde_json::json!({"notes": "revised"})),
        0,
        now,
    )
}

/// A pending action with explicit priority, for ordering tests.
#[must_use]
pub fn prioritized_action(resource: &ResourceId, priority: i32, now: u64) -> PendingAction {
    PendingAction::new(
        ActionKind::Update,
        EntityKind::TimeEntry,
        resource.clone(),
        Payload::empty(),
        priority,
        now,
    )
}

/// A live remote entity at the given version.
#[must_use]
pub fn remote_entity(id: &str, kind: EntityKind, version: u64) -> RemoteEntity {
    RemoteEntity::new(
        id,
        kind,
        VersionStamp::new(version),
        json_payload(serde_json::json!({"notes": "server copy"})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_model::ActionStatus;

    #[test]
    fn temp_store_starts_empty() {
        with_temp_store(|store| {
            assert!(store.queue.is_empty());
            assert!(store.cache.is_empty());
        });
    }

    #[test]
    fn fixture_actions_are_pending() {
        let action = daily_log_create(100);
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.resource_id.is_local());
        assert!(action.is_due(100));
    }

    #[test]
    fn remote_entity_carries_version() {
        let remote = remote_entity("srv_9", EntityKind::TimeEntry, 4);
        assert_eq!(remote.version.get(), 4);
        assert!(!remote.deleted);
    }
}
