//! Aggregate status publication for UI observers.

use fieldsync_model::SyncState;
use parking_lot::{Mutex, RwLock};
use std::sync::mpsc::{channel, Receiver, Sender};

/// Broadcasts [`SyncState`] snapshots to observers.
///
/// The orchestrator publishes after every drain cycle and action status
/// transition; the feed dedupes identical consecutive snapshots so
/// observers only wake for changes. Subscribers that drop their receiver
/// are pruned on the next publish.
pub struct StatusFeed {
    subscribers: Mutex<Vec<Sender<SyncState>>>,
    current: RwLock<Option<SyncState>>,
}

impl StatusFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            current: RwLock::new(None),
        }
    }

    /// Registers an observer.
    ///
    /// The current snapshot, if one exists, is delivered immediately so a
    /// late subscriber does not wait for the next transition.
    pub fn subscribe(&self) -> Receiver<SyncState> {
        let (tx, rx) = channel();
        if let Some(state) = *self.current.read() {
            // A send to our own fresh channel cannot fail
            let _ = tx.send(state);
        }
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publishes a snapshot to every live observer.
    ///
    /// A snapshot equal to the previous one is dropped silently.
    pub fn publish(&self, state: SyncState) {
        {
            let mut current = self.current.write();
            if *current == Some(state) {
                return;
            }
            *current = Some(state);
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(state).is_ok());
    }

    /// Returns the most recently published snapshot.
    #[must_use]
    pub fn current(&self) -> Option<SyncState> {
        *self.current.read()
    }

    /// Returns how many observers are registered.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatusFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusFeed")
            .field("subscribers", &self.subscriber_count())
            .field("current", &self.current())
            .finish()
    }
}
