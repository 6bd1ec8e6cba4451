//! Opens the queue and cache together as one store.

use crate::cache::MirrorCache;
use crate::dir::StoreDir;
use crate::error::StoreResult;
use crate::file::FileBackend;
use crate::queue::ActionQueue;
use std::path::Path;
use std::sync::Arc;

/// The durable state backing one device: action queue plus mirror cache.
///
/// Opening a store takes an exclusive lock on its directory, so two
/// processes cannot share one. The lock is held until the store drops.
pub struct Store {
    dir: StoreDir,
    /// The pending-action queue.
    pub queue: Arc<ActionQueue>,
    /// The entity mirror.
    pub cache: Arc<MirrorCache>,
}

impl Store {
    /// Opens the store rooted at `path`, replaying both journals.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing (and
    /// `create_if_missing` is false), locked by another process, or holds
    /// a corrupted journal.
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        let dir = StoreDir::open(path, create_if_missing)?;
        let queue = ActionQueue::open(Box::new(FileBackend::open(&dir.queue_log())?))?;
        let cache = MirrorCache::open(Box::new(FileBackend::open(&dir.cache_log())?))?;

        tracing::info!(
            root = %dir.root().display(),
            actions = queue.len(),
            entities = cache.len(),
            "store opened"
        );

        Ok(Self {
            dir,
            queue: Arc::new(queue),
            cache: Arc::new(cache),
        })
    }

    /// Returns the store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    /// Rewrites both journals down to their live records.
    ///
    /// # Errors
    ///
    /// Returns an error if either rewrite fails.
    pub fn compact(&self) -> StoreResult<()> {
        self.queue.compact()?;
        self.cache.compact()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.dir.root())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use fieldsync_model::{ActionKind, EntityKind, Payload, PendingAction, ResourceId};
    use tempfile::tempdir;

    #[test]
    fn open_creates_both_journals() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let store = Store::open(&root, true).unwrap();
        assert!(store.queue.is_empty());
        assert!(store.cache.is_empty());
        assert!(root.join("queue.log").exists());
        assert!(root.join("cache.log").exists());
    }

    #[test]
    fn second_open_is_rejected_while_locked() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let _store = Store::open(&root, true).unwrap();
        let err = Store::open(&root, true).unwrap_err();
        assert!(matches!(err, StoreError::Locked { .. }));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let id;
        {
            let store = Store::open(&root, true).unwrap();
            let resource = ResourceId::new_local();
            let action = PendingAction::new(
                ActionKind::Create,
                EntityKind::DailyLog,
                resource.clone(),
                Payload::empty(),
                0,
                100,
            );
            id = store.queue.enqueue(action).unwrap();
            store
                .cache
                .apply_local(&resource, EntityKind::DailyLog, Payload::empty(), 100)
                .unwrap();
        }

        let store = Store::open(&root, true).unwrap();
        assert!(store.queue.get(id).is_some());
        assert_eq!(store.cache.len(), 1);
    }

    #[test]
    fn compact_compacts_both_journals() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let store = Store::open(&root, true).unwrap();
        let resource = ResourceId::server("srv_1");
        for i in 0..10 {
            store
                .cache
                .apply_local(&resource, EntityKind::DailyLog, Payload::empty(), i)
                .unwrap();
        }

        store.compact().unwrap();
        assert_eq!(store.cache.len(), 1);
    }
}
