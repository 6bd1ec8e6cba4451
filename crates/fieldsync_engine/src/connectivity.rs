//! Connectivity signal feeding the drain loop.

use parking_lot::{Mutex, RwLock};

/// Whether the device currently has a usable network path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Requests can be attempted.
    Online,
    /// Requests will not be attempted; work queues up.
    Offline,
}

impl Connectivity {
    /// Returns true for [`Connectivity::Online`].
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

type TransitionFn = Box<dyn Fn(Connectivity, Connectivity) + Send>;

/// Shared online/offline state with transition callbacks.
///
/// Whatever probes reachability (the platform's network monitor, a
/// heartbeat endpoint) feeds `set_state`; the engine only consumes the
/// signal. Going offline never cancels in-flight gateway calls, it only
/// stops new dispatches; coming back online is the cue for a full drain.
pub struct ConnectivityMonitor {
    state: RwLock<Connectivity>,
    listeners: Mutex<Vec<TransitionFn>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given starting state.
    #[must_use]
    pub fn new(initial: Connectivity) -> Self {
        Self {
            state: RwLock::new(initial),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> Connectivity {
        *self.state.read()
    }

    /// Returns true while online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Records a state change, notifying listeners on a real transition.
    ///
    /// Returns true if the state changed.
    pub fn set_state(&self, next: Connectivity) -> bool {
        let previous = {
            let mut state = self.state.write();
            let previous = *state;
            if previous == next {
                return false;
            }
            *state = next;
            previous
        };

        tracing::info!(from = ?previous, to = ?next, "connectivity changed");

        let listeners = self.listeners.lock();
        for listener in listeners.iter() {
            listener(previous, next);
        }
        true
    }

    /// Registers a transition callback, invoked as `(from, to)`.
    pub fn on_transition(&self, listener: impl Fn(Connectivity, Connectivity) + Send + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn transitions_fire_listeners_once() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        monitor.on_transition(move |from, to| {
            assert_eq!(from, Connectivity::Offline);
            assert_eq!(to, Connectivity::Online);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(monitor.set_state(Connectivity::Online));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(monitor.is_online());
    }

    #[test]
    fn setting_the_same_state_is_silent() {
        let monitor = ConnectivityMonitor::new(Connectivity::Online);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        monitor.on_transition(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!monitor.set_state(Connectivity::Online));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
