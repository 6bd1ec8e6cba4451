//! Identifier newtypes.
//!
//! Three id spaces exist in FieldSync:
//! - [`ActionId`]: identifies a queued action; generated at enqueue time and
//!   used as the idempotency token for gateway calls.
//! - [`LocalId`]: client-generated id for an entity created offline, valid
//!   only until the server assigns a real id.
//! - [`ServerId`]: server-assigned id, authoritative once known.
//!
//! [`ResourceId`] is the union of the last two: every action and cache entry
//! targets either a local or a server resource, and creations migrate from
//! `Local` to `Server` exactly once.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a pending action.
///
/// Action IDs are 128-bit UUIDs that are:
/// - Generated locally at enqueue time
/// - Stable for the action's lifetime
/// - Sent to the remote gateway as the idempotency token
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId([u8; 16]);

impl ActionId {
    /// Creates an action ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a new random action ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    /// Parses an action ID from its hyphenated string form.
    pub fn parse(s: &str) -> ModelResult<Self> {
        let uuid = Uuid::parse_str(s)
            .map_err(|e| ModelError::invalid_id(format!("bad action id {s:?}: {e}")))?;
        Ok(Self(uuid.into_bytes()))
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({})", self.to_uuid())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

/// Client-generated identifier for an entity created while offline.
///
/// A local ID exists only until the creating action syncs; the orchestrator
/// then remaps every reference to the server-assigned id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalId([u8; 16]);

impl LocalId {
    /// Creates a local ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a new random local ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.to_uuid())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

/// Server-assigned identifier for a synced entity.
///
/// Opaque to the client; compared and stored verbatim.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerId(String);

impl ServerId {
    /// Creates a server ID from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerId({})", self.0)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The entity a pending action or cache entry targets.
///
/// Entities created offline start with a [`LocalId`]; once the creating
/// action syncs, every `Local` reference is remapped to the `Server` form.
/// A `Local` variant is therefore also the "remap still pending" marker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceId {
    /// Client-generated id awaiting a server assignment.
    Local(LocalId),
    /// Server-assigned id.
    Server(ServerId),
}

impl ResourceId {
    /// Creates a fresh local resource id for an offline creation.
    #[must_use]
    pub fn new_local() -> Self {
        Self::Local(LocalId::new())
    }

    /// Creates a server resource id.
    #[must_use]
    pub fn server(id: impl Into<String>) -> Self {
        Self::Server(ServerId::new(id))
    }

    /// Returns true if this id is still local (remap pending).
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns true if this id is server-assigned.
    #[must_use]
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// Returns the local id, if any.
    #[must_use]
    pub fn as_local(&self) -> Option<&LocalId> {
        match self {
            Self::Local(id) => Some(id),
            Self::Server(_) => None,
        }
    }

    /// Returns the server id, if any.
    #[must_use]
    pub fn as_server(&self) -> Option<&ServerId> {
        match self {
            Self::Local(_) => None,
            Self::Server(id) => Some(id),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local:{id}"),
            Self::Server(id) => write!(f, "server:{id}"),
        }
    }
}

impl From<LocalId> for ResourceId {
    fn from(id: LocalId) -> Self {
        Self::Local(id)
    }
}

impl From<ServerId> for ResourceId {
    fn from(id: ServerId) -> Self {
        Self::Server(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_ids_are_unique() {
        let id1 = ActionId::new();
        let id2 = ActionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn action_id_from_bytes_roundtrip() {
        let bytes = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let id = ActionId::from_bytes(bytes);
        assert_eq!(*id.as_bytes(), bytes);
    }

    #[test]
    fn action_id_parse_roundtrip() {
        let id = ActionId::new();
        let parsed = ActionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn action_id_parse_rejects_garbage() {
        assert!(ActionId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn resource_id_variants() {
        let local = ResourceId::new_local();
        assert!(local.is_local());
        assert!(!local.is_server());
        assert!(local.as_local().is_some());
        assert!(local.as_server().is_none());

        let server = ResourceId::server("srv_123");
        assert!(server.is_server());
        assert_eq!(server.as_server().unwrap().as_str(), "srv_123");
    }

    #[test]
    fn resource_id_display_is_prefixed() {
        let server = ResourceId::server("srv_9");
        assert_eq!(server.to_string(), "server:srv_9");

        let local = ResourceId::Local(LocalId::from_bytes([0; 16]));
        assert!(local.to_string().starts_with("local:"));
    }

    #[test]
    fn server_id_equality_is_verbatim() {
        assert_eq!(ServerId::new("a"), ServerId::from("a"));
        assert_ne!(ServerId::new("a"), ServerId::new("A"));
    }

    #[test]
    fn resource_id_serde_roundtrip() {
        let id = ResourceId::server("srv_42");
        let mut buf = Vec::new();
        ciborium::into_writer(&id, &mut buf).unwrap();
        let back: ResourceId = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(id, back);
    }
}
