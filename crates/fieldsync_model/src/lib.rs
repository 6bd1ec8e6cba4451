//! # FieldSync Model
//!
//! Shared data model for the FieldSync offline mutation queue.
//!
//! This crate provides:
//! - Identifier newtypes (`ActionId`, `LocalId`, `ServerId`, `ResourceId`)
//! - `PendingAction` for queued, not-yet-confirmed mutations
//! - `MirrorEntity` and `RemoteEntity` for cached and server-confirmed state
//! - Conflict resolution types (`ResolutionOutcome`, `PolicyTable`, `MergeRules`)
//! - The `SyncState` snapshot published to UI observers
//!
//! This is a pure data crate with no I/O operations. Every persisted type
//! derives `serde` traits so the store layer can journal it as CBOR.
//!
//! ## Key Invariants
//!
//! - Action kinds and statuses are closed enums, never free-form strings
//! - An action's id is assigned at enqueue time and never changes; it doubles
//!   as the idempotency token for the remote gateway
//! - A `Local` resource id marks an entity still awaiting its server id

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod entity;
mod error;
mod id;
mod payload;
mod resolution;
mod status;

pub use action::{ActionKind, ActionStatus, PendingAction};
pub use entity::{EntityKind, MirrorEntity, RemoteEntity, VersionStamp};
pub use error::{ModelError, ModelResult};
pub use id::{ActionId, LocalId, ResourceId, ServerId};
pub use payload::Payload;
pub use resolution::{
    FieldMerge, ManualChoice, MergeRules, PolicyTable, ResolutionOutcome, ResolutionPolicy,
};
pub use status::{StatusCounts, SyncState};
