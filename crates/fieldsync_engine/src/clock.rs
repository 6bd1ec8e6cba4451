//! Injected time source and cooperative cancellation.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A cooperative cancellation flag shared between threads.
///
/// Cancellation never interrupts an in-flight gateway call; it wakes
/// blocked waits and stops new work from starting.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and wakes every blocked wait.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        // Take the lock so a waiter cannot check the flag and park
        // between our store and notify
        let _guard = self.inner.lock.lock();
        self.inner.cv.notify_all();
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks for `duration` or until cancelled, whichever comes first.
    ///
    /// Returns false if the token was cancelled.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_cancelled() {
            return false;
        }
        self.inner.cv.wait_for(&mut guard, duration);
        !self.is_cancelled()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Time source for the engine.
///
/// All timestamps are Unix-epoch milliseconds. Injecting the clock keeps
/// retry scheduling deterministic under test.
pub trait Clock: Send + Sync {
    /// Returns the current time in Unix-epoch milliseconds.
    fn now_millis(&self) -> u64;

    /// Waits for `duration`, or less if the token cancels.
    ///
    /// Returns false if the wait was cancelled.
    fn wait(&self, duration: Duration, token: &CancelToken) -> bool;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn wait(&self, duration: Duration, token: &CancelToken) -> bool {
        token.wait_timeout(duration)
    }
}

/// A hand-cranked clock for deterministic tests.
///
/// `wait` never blocks; it advances the clock by the requested duration,
/// so backoff tests run instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock starting at the given time.
    #[must_use]
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn wait(&self, duration: Duration, token: &CancelToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        self.advance(duration.as_millis() as u64);
        true
    }
}
