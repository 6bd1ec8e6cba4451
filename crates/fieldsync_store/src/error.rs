//! Error types for store operations.

use fieldsync_model::{ActionId, ActionStatus, ResourceId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// A journal record failed structural validation.
    #[error("journal corrupted: {message}")]
    Corrupted {
        /// What was wrong, including the record offset.
        message: String,
    },

    /// A journal record's checksum did not match its contents.
    #[error("checksum mismatch at offset {offset}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Offset of the bad record.
        offset: u64,
        /// Checksum stored in the record.
        stored: u32,
        /// Checksum computed over the record bytes.
        computed: u32,
    },

    /// A record could not be encoded or decoded as CBOR.
    #[error("record codec error: {message}")]
    Codec {
        /// Error message.
        message: String,
    },

    /// The store directory is locked by another process.
    #[error("store directory is locked: {path}")]
    Locked {
        /// The directory that could not be locked.
        path: PathBuf,
    },

    /// The store directory does not exist and creation was not requested.
    #[error("store directory not found: {path}")]
    DirNotFound {
        /// The missing directory.
        path: PathBuf,
    },

    /// A queue operation referenced an action that is not in the queue.
    #[error("action not found: {id}")]
    ActionNotFound {
        /// The missing action id.
        id: ActionId,
    },

    /// A status transition was requested that the lifecycle does not allow.
    #[error("invalid transition for action {id}: {from} -> {to}")]
    InvalidTransition {
        /// The action being transitioned.
        id: ActionId,
        /// Current status.
        from: ActionStatus,
        /// Requested status.
        to: ActionStatus,
    },

    /// A second action would have entered `Syncing` for the same resource.
    #[error("resource {resource} already has an action syncing")]
    ResourceBusy {
        /// The contended resource.
        resource: ResourceId,
    },

    /// A cache operation referenced an entity that is not cached.
    #[error("entity not found in cache: {id}")]
    EntityNotFound {
        /// The missing resource id.
        id: ResourceId,
    },
}

impl StoreError {
    /// Creates a journal corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a record codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::corrupted("invalid magic at offset 12");
        assert!(err.to_string().contains("offset 12"));

        let err = StoreError::ChecksumMismatch {
            offset: 7,
            stored: 0xDEAD_BEEF,
            computed: 0xCAFE_BABE,
        };
        assert!(err.to_string().contains("0xdeadbeef"));
    }

    #[test]
    fn locked_error_names_path() {
        let err = StoreError::Locked {
            path: PathBuf::from("/tmp/fieldsync"),
        };
        assert!(err.to_string().contains("/tmp/fieldsync"));
    }
}
