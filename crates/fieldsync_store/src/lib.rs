//! # FieldSync Store
//!
//! Durable storage for the FieldSync offline mutation queue.
//!
//! This crate provides:
//! - [`StoreBackend`] - opaque append-only byte store abstraction
//! - [`Journal`] - checksummed CBOR record log with torn-tail recovery
//! - [`ActionQueue`] - the durable pending-action queue
//! - [`MirrorCache`] - the durable mirror of last-known-good entities
//! - [`StoreDir`] - on-disk layout with an exclusive advisory lock
//!
//! ## Durability Model
//!
//! Every queue and cache state change is one framed journal record appended
//! before the in-memory state updates. A crash at any point therefore loses
//! at most the record being written; replay treats a torn tail as the end of
//! the journal and rebuilds exactly the state of the last complete write.
//! In-flight (`Syncing`) actions found during replay are demoted back to
//! `Pending`, so an interrupted drain is simply retried.
//!
//! Journals grow without bound until [`ActionQueue::compact`] or
//! [`MirrorCache::compact`] rewrites them to live state.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod dir;
mod error;
mod file;
mod journal;
mod memory;
mod queue;
mod store;

pub use backend::StoreBackend;
pub use cache::{CacheRecord, MirrorCache};
pub use dir::StoreDir;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use journal::{Journal, Replay, JOURNAL_FORMAT_VERSION, JOURNAL_TAG_CACHE, JOURNAL_TAG_QUEUE};
pub use memory::InMemoryBackend;
pub use queue::{ActionQueue, QueueRecord};
pub use store::Store;
