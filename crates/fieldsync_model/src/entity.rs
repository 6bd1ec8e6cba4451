//! Entity kinds, version stamps, and entity projections.

use crate::id::{ResourceId, ServerId};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The catalogue of syncable domain entities.
///
/// Closed on purpose: adding a kind forces every per-kind policy match to
/// be revisited at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A crew's daily site log.
    DailyLog,
    /// A worker time entry.
    TimeEntry,
    /// A safety incident report.
    SafetyIncident,
}

impl EntityKind {
    /// All known entity kinds.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::DailyLog,
        EntityKind::TimeEntry,
        EntityKind::SafetyIncident,
    ];
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::DailyLog => "daily_log",
            EntityKind::TimeEntry => "time_entry",
            EntityKind::SafetyIncident => "safety_incident",
        };
        write!(f, "{name}")
    }
}

/// Monotonic version stamp on a server entity.
///
/// The server bumps the stamp on every accepted write; the gateway compares
/// the client's last-seen stamp against it to detect genuine conflicts
/// instead of silently overwriting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct VersionStamp(u64);

impl VersionStamp {
    /// Creates a version stamp.
    #[inline]
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw version number.
    #[inline]
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the next version stamp.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A server-confirmed entity returned by the remote gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntity {
    /// Server-assigned id.
    pub id: ServerId,
    /// Domain kind.
    pub entity_kind: EntityKind,
    /// Version stamp after the confirmed write.
    pub version: VersionStamp,
    /// Entity body as the server last stored it.
    pub body: Payload,
    /// True if the server has deleted this entity.
    pub deleted: bool,
}

impl RemoteEntity {
    /// Creates a live remote entity.
    #[must_use]
    pub fn new(
        id: impl Into<ServerId>,
        entity_kind: EntityKind,
        version: VersionStamp,
        body: Payload,
    ) -> Self {
        Self {
            id: id.into(),
            entity_kind,
            version,
            body,
            deleted: false,
        }
    }

    /// Creates a deletion confirmation.
    #[must_use]
    pub fn tombstone(id: impl Into<ServerId>, entity_kind: EntityKind, version: VersionStamp) -> Self {
        Self {
            id: id.into(),
            entity_kind,
            version,
            body: Payload::empty(),
            deleted: true,
        }
    }
}

/// A local projection of a server entity.
///
/// Mirror entities back all reads while offline. They are written both by
/// confirmed sync results and by optimistic local edits; `pending_sync`
/// distinguishes the two. An entry keyed by a `Local` resource id belongs
/// to an offline creation whose id remap is still pending.
///
/// A mirror entity is destroyed only by a confirmed server deletion or by
/// explicit cache eviction, never as a side effect of sync failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEntity {
    /// The entity's current id (local until remapped).
    pub resource_id: ResourceId,
    /// Domain kind.
    pub entity_kind: EntityKind,
    /// Last server-confirmed version, if the entity has ever synced.
    pub version: Option<VersionStamp>,
    /// Entity body served to readers.
    pub body: Payload,
    /// True while local edits to this entity await confirmation.
    pub pending_sync: bool,
    /// Unix-epoch milliseconds of the last local write.
    pub updated_at: u64,
}

impl MirrorEntity {
    /// Creates a mirror entry for an optimistic local write.
    #[must_use]
    pub fn local(
        resource_id: ResourceId,
        entity_kind: EntityKind,
        body: Payload,
        now: u64,
    ) -> Self {
        Self {
            resource_id,
            entity_kind,
            version: None,
            body,
            pending_sync: true,
            updated_at: now,
        }
    }

    /// Creates a mirror entry from a server-confirmed entity.
    #[must_use]
    pub fn from_remote(remote: &RemoteEntity, now: u64) -> Self {
        Self {
            resource_id: ResourceId::Server(remote.id.clone()),
            entity_kind: remote.entity_kind,
            version: Some(remote.version),
            body: remote.body.clone(),
            pending_sync: false,
            updated_at: now,
        }
    }

    /// Returns true if this entity still awaits its server id.
    #[must_use]
    pub fn awaiting_remap(&self) -> bool {
        self.resource_id.is_local()
    }
}
