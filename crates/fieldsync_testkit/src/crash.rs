//! Crash simulation and recovery testing.
//!
//! Two tools live here:
//!
//! - [`CrashableBackend`] simulates a process dying mid-append. It fails
//!   writes past a byte threshold, optionally leaving a partial (torn)
//!   record behind, exactly what a power cut leaves on disk.
//! - [`RecoveryHarness`] drives the open / mutate / crash / reopen /
//!   verify cycle against a real store directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldsync_testkit::crash::CrashableBackend;
//!
//! let backend = CrashableBackend::new();
//! let control = backend.controller();
//! let queue = ActionQueue::open(Box::new(backend))?;
//! control.crash_after_bytes(control.bytes_written() + 20);
//! assert!(queue.enqueue(action).is_err());
//! // control.surviving_data() now ends in a torn record
//! ```

use fieldsync_store::{Store, StoreBackend, StoreError, StoreResult};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Default)]
struct CrashState {
    data: RwLock<Vec<u8>>,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_flush: AtomicBool,
}

fn simulated(op: &str) -> StoreError {
    StoreError::Io(std::io::Error::other(format!(
        "simulated crash during {op}"
    )))
}

/// An in-memory storage backend that can simulate crashes.
///
/// The backend itself moves into whatever journal owns it; keep the
/// [`CrashController`] returned by [`controller`](Self::controller) to
/// arm crashes and read the surviving bytes afterwards.
#[derive(Debug, Default)]
pub struct CrashableBackend {
    state: Arc<CrashState>,
}

impl CrashableBackend {
    /// Creates an empty crashable backend.
    #[must_use]
    pub fn new() -> Self {
        let backend = Self::default();
        backend
            .state
            .crash_after_bytes
            .store(usize::MAX, Ordering::SeqCst);
        backend
    }

    /// Creates a crashable backend over pre-existing journal bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        let backend = Self::new();
        *backend.state.data.write() = data;
        backend
    }

    /// Returns a control handle that stays usable after the backend is
    /// boxed and moved into a journal.
    #[must_use]
    pub fn controller(&self) -> CrashController {
        CrashController {
            state: Arc::clone(&self.state),
        }
    }
}

impl StoreBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let data = self.state.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StoreError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StoreResult<u64> {
        let current = self
            .state
            .bytes_written
            .fetch_add(bytes.len(), Ordering::SeqCst);
        let threshold = self.state.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("append"));
        }

        if current + bytes.len() > threshold {
            // Cross the threshold mid-record: leave a torn tail behind
            self.state.crashed.store(true, Ordering::SeqCst);
            let partial = threshold - current;
            if partial > 0 {
                self.state.data.write().extend_from_slice(&bytes[..partial]);
            }
            return Err(simulated("partial append"));
        }

        let mut data = self.state.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StoreResult<()> {
        if self.state.fail_on_flush.load(Ordering::SeqCst) {
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("flush"));
        }
        Ok(())
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.state.data.read().len() as u64)
    }

    fn sync(&mut self) -> StoreResult<()> {
        if self.state.fail_on_flush.load(Ordering::SeqCst) {
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("sync"));
        }
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> StoreResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(simulated("replace"));
        }
        *self.state.data.write() = bytes.to_vec();
        Ok(())
    }
}

/// Control handle for a [`CrashableBackend`].
#[derive(Debug, Clone)]
pub struct CrashController {
    state: Arc<CrashState>,
}

impl CrashController {
    /// Arms the backend to crash once the total appended bytes would pass
    /// `threshold`. The append that crosses it writes a partial record
    /// first, then fails; every later append fails outright.
    pub fn crash_after_bytes(&self, threshold: usize) {
        self.state
            .crash_after_bytes
            .store(threshold, Ordering::SeqCst);
    }

    /// Makes every flush and sync fail.
    pub fn fail_on_flush(&self, fail: bool) {
        self.state.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Disarms the crash and clears the crashed flag.
    pub fn reset(&self) {
        self.state
            .crash_after_bytes
            .store(usize::MAX, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
        self.state.fail_on_flush.store(false, Ordering::SeqCst);
    }

    /// Returns whether a simulated crash has fired.
    #[must_use]
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// Total bytes handed to `append` so far, successful or not.
    #[must_use]
    pub fn bytes_written(&self) -> usize {
        self.state.bytes_written.load(Ordering::SeqCst)
    }

    /// Returns a copy of the bytes that made it to "disk".
    ///
    /// After a crash this is what a reopened journal would replay.
    #[must_use]
    pub fn surviving_data(&self) -> Vec<u8> {
        self.state.data.read().clone()
    }
}

/// Drives open / mutate / crash / reopen / verify cycles for a store.
///
/// "Crash" here means dropping the [`Store`] without compaction or any
/// shutdown step: since every journal append is flushed before the
/// mutating call returns, that is exactly the disk state a killed
/// process leaves. Torn writes are injected separately by truncating a
/// journal tail, and corruption by flipping a byte in place.
pub struct RecoveryHarness {
    root: PathBuf,
    _temp: Option<TempDir>,
}

impl RecoveryHarness {
    /// Creates a harness over a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp directory");
        let root = temp.path().join("store");
        Self {
            root,
            _temp: Some(temp),
        }
    }

    /// Creates a harness over an explicit directory, which is left in
    /// place when the harness drops.
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            root: path.as_ref().to_path_buf(),
            _temp: None,
        }
    }

    /// The store directory under test.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens the store, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn open(&self) -> StoreResult<Store> {
        Store::open(&self.root, true)
    }

    /// Opens the store, applies `mutate`, then drops it mid-flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the open or the mutation fails.
    pub fn mutate(&self, mutate: impl FnOnce(&Store) -> StoreResult<()>) -> StoreResult<()> {
        let store = self.open()?;
        mutate(&store)
    }

    /// Reopens the store and hands it to `verify` for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be reopened; recovery tests treat a
    /// failed reopen as a failed test.
    pub fn verify(&self, verify: impl FnOnce(&Store)) {
        let store = self.open().expect("store failed to reopen after crash");
        verify(&store);
    }

    /// Cuts `bytes` off the end of the queue journal, simulating a torn
    /// final record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be truncated.
    pub fn tear_queue_tail(&self, bytes: u64) -> std::io::Result<()> {
        tear_tail(&self.root.join("queue.log"), bytes)
    }

    /// Cuts `bytes` off the end of the cache journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be truncated.
    pub fn tear_cache_tail(&self, bytes: u64) -> std::io::Result<()> {
        tear_tail(&self.root.join("cache.log"), bytes)
    }

    /// Flips one byte of the queue journal in place.
    ///
    /// Unlike a torn tail this is real corruption: replay must refuse
    /// the journal rather than silently skip the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be rewritten.
    pub fn corrupt_queue_byte(&self, offset: u64) -> std::io::Result<()> {
        let path = self.root.join("queue.log");
        let mut data = std::fs::read(&path)?;
        let index = offset as usize;
        assert!(index < data.len(), "corruption offset past end of journal");
        data[index] ^= 0xFF;
        std::fs::write(&path, data)
    }

    /// Size of the queue journal in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub fn queue_log_size(&self) -> std::io::Result<u64> {
        Ok(std::fs::metadata(self.root.join("queue.log"))?.len())
    }
}

impl Default for RecoveryHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn tear_tail(path: &Path, bytes: u64) -> std::io::Result<()> {
    let len = std::fs::metadata(path)?.len();
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_len(len.saturating_sub(bytes))?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::daily_log_create;
    use fieldsync_model::ActionStatus;

    #[test]
    fn crashable_backend_normal_operation() {
        let mut backend = CrashableBackend::new();
        let control = backend.controller();

        let offset = backend.append(b"field notes").unwrap();
        backend.flush().unwrap();

        assert_eq!(backend.read_at(offset, 11).unwrap(), b"field notes");
        assert!(!control.has_crashed());
    }

    #[test]
    fn crash_on_append_leaves_partial_record() {
        let mut backend = CrashableBackend::new();
        let control = backend.controller();

        backend.append(&[1u8; 5]).unwrap();
        control.crash_after_bytes(8);

        assert!(backend.append(&[2u8; 10]).is_err());
        assert!(control.has_crashed());

        // 5 complete bytes plus 3 torn ones survived
        assert_eq!(control.surviving_data(), vec![1, 1, 1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn appends_after_crash_fail_without_writing() {
        let mut backend = CrashableBackend::new();
        let control = backend.controller();
        control.crash_after_bytes(0);

        assert!(backend.append(b"x").is_err());
        assert!(backend.append(b"y").is_err());
        assert!(control.surviving_data().is_empty());
    }

    #[test]
    fn crash_on_flush() {
        let mut backend = CrashableBackend::new();
        let control = backend.controller();
        control.fail_on_flush(true);

        assert!(backend.flush().is_err());
        assert!(control.has_crashed());

        control.reset();
        assert!(backend.flush().is_ok());
    }

    #[test]
    fn harness_reopens_committed_state() {
        let harness = RecoveryHarness::new();

        harness
            .mutate(|store| store.queue.enqueue(daily_log_create(100)).map(|_| ()))
            .unwrap();

        harness.verify(|store| {
            assert_eq!(store.queue.len(), 1);
            let action = &store.queue.actions()[0];
            assert_eq!(action.status, ActionStatus::Pending);
        });
    }

    #[test]
    fn torn_queue_tail_drops_only_last_record() {
        let harness = RecoveryHarness::new();

        harness
            .mutate(|store| {
                store.queue.enqueue(daily_log_create(100))?;
                store.queue.enqueue(daily_log_create(200))?;
                Ok(())
            })
            .unwrap();

        harness.tear_queue_tail(3).unwrap();
        harness.verify(|store| assert_eq!(store.queue.len(), 1));
    }

    #[test]
    fn corrupted_queue_byte_fails_reopen() {
        let harness = RecoveryHarness::new();

        harness
            .mutate(|store| store.queue.enqueue(daily_log_create(100)).map(|_| ()))
            .unwrap();

        // Flip a payload byte in the first record
        harness.corrupt_queue_byte(16).unwrap();
        assert!(harness.open().is_err());
    }
}
