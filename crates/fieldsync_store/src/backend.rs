//! Storage backend trait definition.

use crate::error::StoreResult;

/// A low-level storage backend for FieldSync journals.
///
/// Backends are **opaque byte stores**. They provide simple operations for
/// reading, appending, and flushing data. The journal layer owns all record
/// framing - backends do not understand records, checksums, or entities.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `flush` ensures all appended data survives a process crash
/// - `replace` atomically swaps the entire content (used by compaction)
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StoreBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The offset is beyond the current size
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StoreResult<u64>;

    /// Flushes all pending writes to durable storage.
    ///
    /// After this returns successfully, all previously appended data
    /// is guaranteed to survive process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StoreResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// This is the offset where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StoreResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// This is a stronger guarantee than `flush` - it ensures that
    /// file metadata (size, timestamps) is also durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StoreResult<()>;

    /// Atomically replaces the entire content of the storage.
    ///
    /// Used by journal compaction: either the old content or the new
    /// content is observed after a crash, never a mixture. Subsequent
    /// appends continue from the end of the new content.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement cannot be made durable.
    fn replace(&mut self, data: &[u8]) -> StoreResult<()>;
}
