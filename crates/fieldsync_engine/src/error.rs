//! Error types for the sync engine.

use fieldsync_model::RemoteEntity;
use fieldsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing an action.
///
/// The variant decides the action's fate: `Network` and `Server` are
/// retried with backoff, `Validation` fails the action immediately, `Auth`
/// halts the whole engine until re-authentication, and `Conflict` is not a
/// failure at all but input to the resolver.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request never reached the server (offline, timeout, DNS).
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// The server rejected the credentials.
    #[error("authentication required: {message}")]
    Auth {
        /// Error message.
        message: String,
    },

    /// The server rejected the mutation as invalid.
    #[error("validation rejected: {message}")]
    Validation {
        /// Server-provided reason, preserved for display.
        message: String,
    },

    /// The server state diverged from what the action was written against.
    #[error("version conflict on entity {}", .0.id)]
    Conflict(Box<RemoteEntity>),

    /// The server failed internally.
    #[error("server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// The durable store failed underneath the engine.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The engine is shutting down; the attempt was abandoned before
    /// dispatch.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Creates a conflict signal carrying the server's current entity.
    pub fn conflict(remote: RemoteEntity) -> Self {
        Self::Conflict(Box::new(remote))
    }

    /// Returns true if the failed attempt should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network { .. } | SyncError::Server { .. })
    }

    /// Returns true if this error must halt all syncing until re-auth.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_model::{EntityKind, Payload, VersionStamp};

    #[test]
    fn retryable_classification() {
        assert!(SyncError::network("connection reset").is_retryable());
        assert!(SyncError::server("internal error").is_retryable());
        assert!(!SyncError::auth("token expired").is_retryable());
        assert!(!SyncError::validation("hours must be positive").is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn auth_classification() {
        assert!(SyncError::auth("token expired").is_auth());
        assert!(!SyncError::network("offline").is_auth());
    }

    #[test]
    fn conflict_display_names_the_entity() {
        let remote = RemoteEntity::new(
            "srv_42",
            EntityKind::DailyLog,
            VersionStamp::new(3),
            Payload::empty(),
        );
        let err = SyncError::conflict(remote);
        assert!(err.to_string().contains("srv_42"));
    }
}
