//! The durable mirror of server entities.

use crate::backend::StoreBackend;
use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, JOURNAL_TAG_CACHE};
use fieldsync_model::{EntityKind, MirrorEntity, Payload, RemoteEntity, ResourceId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One durable cache mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheRecord {
    /// Insert or overwrite an entity.
    Put(MirrorEntity),
    /// Remove an entity.
    Remove(ResourceId),
    /// Move an entity from one id to another, rewriting its stored id.
    Remap {
        /// The id being retired.
        from: ResourceId,
        /// The server-assigned replacement.
        to: ResourceId,
    },
}

/// The read model the app serves screens from, online or offline.
///
/// The cache holds the freshest known state of every entity the device
/// cares about: server-confirmed bodies plus optimistic local edits that
/// are still queued. Reads clone under a short read lock and never wait
/// on sync activity.
///
/// Sync confirmations go through [`confirm`](Self::confirm), which refuses
/// to clobber local edits newer than the request it is confirming.
pub struct MirrorCache {
    journal: Journal<CacheRecord>,
    entities: RwLock<HashMap<ResourceId, MirrorEntity>>,
}

impl MirrorCache {
    /// Opens a cache over the given backend, replaying its journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal is corrupted (a torn tail is not
    /// corruption and is discarded silently).
    pub fn open(backend: Box<dyn StoreBackend>) -> StoreResult<Self> {
        let journal = Journal::new(backend, JOURNAL_TAG_CACHE, true);
        let replay = journal.replay()?;

        if replay.trailing_bytes > 0 {
            tracing::warn!(
                trailing_bytes = replay.trailing_bytes,
                "discarding torn tail of cache journal"
            );
            // Rewrite so later appends don't land after the torn bytes
            journal.rewrite(&replay.records)?;
        }

        let mut entities: HashMap<ResourceId, MirrorEntity> = HashMap::new();
        for record in replay.records {
            match record {
                CacheRecord::Put(entity) => {
                    entities.insert(entity.resource_id.clone(), entity);
                }
                CacheRecord::Remove(id) => {
                    entities.remove(&id);
                }
                CacheRecord::Remap { from, to } => {
                    if let Some(mut entity) = entities.remove(&from) {
                        entity.resource_id = to.clone();
                        entities.insert(to, entity);
                    }
                }
            }
        }

        tracing::debug!(entities = entities.len(), "mirror cache opened");

        Ok(Self {
            journal,
            entities: RwLock::new(entities),
        })
    }

    /// Inserts or replaces an entity.
    pub fn upsert(&self, entity: MirrorEntity) -> StoreResult<()> {
        let mut entities = self.entities.write();
        self.journal.append(&CacheRecord::Put(entity.clone()))?;
        entities.insert(entity.resource_id.clone(), entity);
        Ok(())
    }

    /// Returns a copy of one entity.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<MirrorEntity> {
        self.entities.read().get(id).cloned()
    }

    /// Returns every entity matching the filter, ordered by resource id.
    #[must_use]
    pub fn query(&self, filter: impl Fn(&MirrorEntity) -> bool) -> Vec<MirrorEntity> {
        let entities = self.entities.read();
        let mut matched: Vec<MirrorEntity> =
            entities.values().filter(|e| filter(e)).cloned().collect();
        matched.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        matched
    }

    /// Records an optimistic local write.
    ///
    /// Creates the entity if it is new; otherwise replaces the body while
    /// keeping the last confirmed version. Either way the entry is flagged
    /// `pending_sync` until a confirmation settles it.
    pub fn apply_local(
        &self,
        resource_id: &ResourceId,
        entity_kind: EntityKind,
        body: Payload,
        now: u64,
    ) -> StoreResult<()> {
        let mut entities = self.entities.write();
        let entity = match entities.get(resource_id) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.body = body;
                updated.pending_sync = true;
                updated.updated_at = now;
                updated
            }
            None => MirrorEntity::local(resource_id.clone(), entity_kind, body, now),
        };
        self.journal.append(&CacheRecord::Put(entity.clone()))?;
        entities.insert(resource_id.clone(), entity);
        Ok(())
    }

    /// Applies a server-confirmed entity.
    ///
    /// `still_pending` is true when more actions for this resource remain
    /// queued; `dispatched_at` is when the confirmed request entered
    /// flight. Local state wins over the confirmation in two cases:
    ///
    /// - more local edits are queued behind the confirmed one, or
    /// - the entry was edited after the confirmed request was dispatched
    ///   (the edit is not yet queued but must not be lost).
    ///
    /// In both cases the confirmed version stamp is adopted while the
    /// local body stays. A confirmation older than the entry's version is
    /// ignored outright, and a deletion removes the entry.
    pub fn confirm(
        &self,
        remote: &RemoteEntity,
        still_pending: bool,
        dispatched_at: u64,
        now: u64,
    ) -> StoreResult<()> {
        let key = ResourceId::Server(remote.id.clone());
        let mut entities = self.entities.write();

        if remote.deleted {
            if entities.contains_key(&key) {
                self.journal.append(&CacheRecord::Remove(key.clone()))?;
                entities.remove(&key);
            }
            return Ok(());
        }

        if let Some(existing) = entities.get(&key) {
            if existing.version.is_some_and(|v| v > remote.version) {
                tracing::debug!(id = %remote.id, "ignoring stale confirmation");
                return Ok(());
            }
        }

        let entity = match entities.get(&key) {
            Some(existing)
                if still_pending
                    || (existing.pending_sync && existing.updated_at > dispatched_at) =>
            {
                let mut kept = existing.clone();
                kept.version = Some(remote.version);
                kept.pending_sync = true;
                kept
            }
            _ => {
                let mut entity = MirrorEntity::from_remote(remote, now);
                entity.pending_sync = still_pending;
                entity
            }
        };

        self.journal.append(&CacheRecord::Put(entity.clone()))?;
        entities.insert(key, entity);
        Ok(())
    }

    /// Moves an entity to a new id, rewriting its stored id.
    ///
    /// One durable record covers both the key move and the id rewrite, so
    /// the remap is atomic across crashes and no reader can observe the
    /// entity under both ids.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if `from` has no entry.
    pub fn remap_id(&self, from: &ResourceId, to: &ResourceId) -> StoreResult<()> {
        let mut entities = self.entities.write();
        if !entities.contains_key(from) {
            return Err(StoreError::EntityNotFound { id: from.clone() });
        }

        self.journal.append(&CacheRecord::Remap {
            from: from.clone(),
            to: to.clone(),
        })?;

        if let Some(mut entity) = entities.remove(from) {
            entity.resource_id = to.clone();
            entities.insert(to.clone(), entity);
        }

        tracing::debug!(%from, %to, "remapped cached entity");
        Ok(())
    }

    /// Removes an entity. Returns true if one was present.
    pub fn evict(&self, id: &ResourceId) -> StoreResult<bool> {
        let mut entities = self.entities.write();
        if !entities.contains_key(id) {
            return Ok(false);
        }
        self.journal.append(&CacheRecord::Remove(id.clone()))?;
        entities.remove(id);
        Ok(true)
    }

    /// Returns the number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if the cache holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Rewrites the journal to one `Put` per live entity.
    pub fn compact(&self) -> StoreResult<()> {
        let entities = self.entities.write();
        let mut records: Vec<CacheRecord> =
            entities.values().cloned().map(CacheRecord::Put).collect();
        records.sort_by(|a, b| match (a, b) {
            (CacheRecord::Put(x), CacheRecord::Put(y)) => x.resource_id.cmp(&y.resource_id),
            _ => std::cmp::Ordering::Equal,
        });
        self.journal.rewrite(&records)?;
        tracing::debug!(records = records.len(), "cache journal compacted");
        Ok(())
    }
}

impl std::fmt::Debug for MirrorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileBackend;
    use crate::memory::InMemoryBackend;
    use fieldsync_model::VersionStamp;
    use tempfile::tempdir;

    fn cache() -> MirrorCache {
        MirrorCache::open(Box::new(InMemoryBackend::new())).unwrap()
    }

    fn body(text: &str) -> Payload {
        Payload::from_bytes(text.as_bytes().to_vec())
    }

    fn confirmed(id: &str, version: u64, text: &str) -> RemoteEntity {
        RemoteEntity::new(
            id,
            EntityKind::DailyLog,
            VersionStamp::new(version),
            body(text),
        )
    }

    #[test]
    fn upsert_and_get() {
        let c = cache();
        let id = ResourceId::server("srv_1");
        let entity = MirrorEntity::local(id.clone(), EntityKind::DailyLog, body("a"), 100);

        c.upsert(entity.clone()).unwrap();
        assert_eq!(c.get(&id), Some(entity));
        assert!(c.get(&ResourceId::server("srv_2")).is_none());
    }

    #[test]
    fn query_filters_and_orders() {
        let c = cache();
        for (id, kind) in [
            ("srv_3", EntityKind::DailyLog),
            ("srv_1", EntityKind::TimeEntry),
            ("srv_2", EntityKind::DailyLog),
        ] {
            c.upsert(MirrorEntity::local(
                ResourceId::server(id),
                kind,
                body(id),
                100,
            ))
            .unwrap();
        }

        let logs = c.query(|e| e.entity_kind == EntityKind::DailyLog);
        let ids: Vec<ResourceId> = logs.into_iter().map(|e| e.resource_id).collect();
        assert_eq!(
            ids,
            vec![ResourceId::server("srv_2"), ResourceId::server("srv_3")]
        );
    }

    #[test]
    fn apply_local_creates_pending_entry() {
        let c = cache();
        let id = ResourceId::new_local();

        c.apply_local(&id, EntityKind::TimeEntry, body("draft"), 100)
            .unwrap();

        let entity = c.get(&id).unwrap();
        assert!(entity.pending_sync);
        assert!(entity.version.is_none());
        assert!(entity.awaiting_remap());
    }

    #[test]
    fn apply_local_keeps_confirmed_version() {
        let c = cache();
        let id = ResourceId::server("srv_1");
        c.confirm(&confirmed("srv_1", 3, "server"), false, 100, 100)
            .unwrap();

        c.apply_local(&id, EntityKind::DailyLog, body("edited"), 200)
            .unwrap();

        let entity = c.get(&id).unwrap();
        assert_eq!(entity.version, Some(VersionStamp::new(3)));
        assert_eq!(entity.body, body("edited"));
        assert!(entity.pending_sync);
    }

    #[test]
    fn confirm_writes_remote_state() {
        let c = cache();
        c.confirm(&confirmed("srv_1", 1, "server"), false, 100, 150)
            .unwrap();

        let entity = c.get(&ResourceId::server("srv_1")).unwrap();
        assert_eq!(entity.body, body("server"));
        assert_eq!(entity.version, Some(VersionStamp::new(1)));
        assert!(!entity.pending_sync);
    }

    #[test]
    fn confirm_keeps_edits_made_after_dispatch() {
        let c = cache();
        let id = ResourceId::server("srv_1");
        // Edit lands at t=200 while a request dispatched at t=150 is in flight
        c.apply_local(&id, EntityKind::DailyLog, body("newer edit"), 200)
            .unwrap();

        c.confirm(&confirmed("srv_1", 2, "server"), false, 150, 250)
            .unwrap();

        let entity = c.get(&id).unwrap();
        assert_eq!(entity.body, body("newer edit"));
        assert_eq!(entity.version, Some(VersionStamp::new(2)));
        assert!(entity.pending_sync);
    }

    #[test]
    fn confirm_keeps_body_while_more_actions_queued() {
        let c = cache();
        let id = ResourceId::server("srv_1");
        c.apply_local(&id, EntityKind::DailyLog, body("second edit"), 100)
            .unwrap();

        c.confirm(&confirmed("srv_1", 2, "first edit"), true, 150, 250)
            .unwrap();

        let entity = c.get(&id).unwrap();
        assert_eq!(entity.body, body("second edit"));
        assert!(entity.pending_sync);
    }

    #[test]
    fn confirm_overwrites_settled_entry() {
        let c = cache();
        let id = ResourceId::server("srv_1");
        // Local edit from before the dispatch; its confirmation arriving
        // means the queue has nothing further for this resource
        c.apply_local(&id, EntityKind::DailyLog, body("old edit"), 100)
            .unwrap();

        c.confirm(&confirmed("srv_1", 2, "server"), false, 150, 250)
            .unwrap();

        let entity = c.get(&id).unwrap();
        assert_eq!(entity.body, body("server"));
        assert!(!entity.pending_sync);
    }

    #[test]
    fn confirm_ignores_stale_version() {
        let c = cache();
        c.confirm(&confirmed("srv_1", 5, "newer"), false, 100, 100)
            .unwrap();

        c.confirm(&confirmed("srv_1", 3, "older"), false, 200, 200)
            .unwrap();

        let entity = c.get(&ResourceId::server("srv_1")).unwrap();
        assert_eq!(entity.body, body("newer"));
        assert_eq!(entity.version, Some(VersionStamp::new(5)));
    }

    #[test]
    fn confirm_deletion_removes_entry() {
        let c = cache();
        c.confirm(&confirmed("srv_1", 1, "server"), false, 100, 100)
            .unwrap();

        let tombstone =
            RemoteEntity::tombstone("srv_1", EntityKind::DailyLog, VersionStamp::new(2));
        c.confirm(&tombstone, false, 200, 200).unwrap();

        assert!(c.get(&ResourceId::server("srv_1")).is_none());
    }

    #[test]
    fn remap_moves_entry_and_rewrites_id() {
        let c = cache();
        let local = ResourceId::new_local();
        let server = ResourceId::server("srv_1");
        c.apply_local(&local, EntityKind::SafetyIncident, body("report"), 100)
            .unwrap();

        c.remap_id(&local, &server).unwrap();

        assert!(c.get(&local).is_none());
        let entity = c.get(&server).unwrap();
        assert_eq!(entity.resource_id, server);
        assert_eq!(entity.body, body("report"));
    }

    #[test]
    fn remap_missing_entity_is_an_error() {
        let c = cache();
        let err = c
            .remap_id(&ResourceId::new_local(), &ResourceId::server("srv_1"))
            .unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound { .. }));
    }

    #[test]
    fn evict_removes_entry() {
        let c = cache();
        let id = ResourceId::server("srv_1");
        c.upsert(MirrorEntity::local(
            id.clone(),
            EntityKind::DailyLog,
            body("a"),
            100,
        ))
        .unwrap();

        assert!(c.evict(&id).unwrap());
        assert!(!c.evict(&id).unwrap());
        assert!(c.get(&id).is_none());
    }

    #[test]
    fn reopen_rebuilds_entities() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        {
            let c = MirrorCache::open(Box::new(FileBackend::open(&path).unwrap())).unwrap();
            c.confirm(&confirmed("srv_1", 4, "server"), false, 100, 100)
                .unwrap();
            c.apply_local(
                &ResourceId::server("srv_1"),
                EntityKind::DailyLog,
                body("edited"),
                200,
            )
            .unwrap();
        }

        let c = MirrorCache::open(Box::new(FileBackend::open(&path).unwrap())).unwrap();
        let entity = c.get(&ResourceId::server("srv_1")).unwrap();
        assert_eq!(entity.body, body("edited"));
        assert_eq!(entity.version, Some(VersionStamp::new(4)));
        assert!(entity.pending_sync);
    }

    #[test]
    fn remap_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        let local = ResourceId::new_local();
        let server = ResourceId::server("srv_1");
        {
            let c = MirrorCache::open(Box::new(FileBackend::open(&path).unwrap())).unwrap();
            c.apply_local(&local, EntityKind::DailyLog, body("report"), 100)
                .unwrap();
            c.remap_id(&local, &server).unwrap();
        }

        let c = MirrorCache::open(Box::new(FileBackend::open(&path).unwrap())).unwrap();
        assert!(c.get(&local).is_none());
        assert_eq!(c.get(&server).unwrap().resource_id, server);
    }

    #[test]
    fn compact_shrinks_journal_and_preserves_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        {
            let c = MirrorCache::open(Box::new(FileBackend::open(&path).unwrap())).unwrap();
            let id = ResourceId::server("srv_1");
            for i in 0..20 {
                c.apply_local(&id, EntityKind::DailyLog, body(&format!("edit {i}")), i)
                    .unwrap();
            }

            let before = c.journal.size().unwrap();
            c.compact().unwrap();
            assert!(c.journal.size().unwrap() < before);
        }

        let c = MirrorCache::open(Box::new(FileBackend::open(&path).unwrap())).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(
            c.get(&ResourceId::server("srv_1")).unwrap().body,
            body("edit 19")
        );
    }
}
