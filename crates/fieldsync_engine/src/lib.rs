//! # FieldSync Engine
//!
//! Sync orchestration for the FieldSync offline mutation queue.
//!
//! This crate provides:
//! - [`SyncOrchestrator`] - drains the pending-action queue through a
//!   [`RemoteGateway`], applying outcomes to the queue and mirror cache
//! - [`resolve`] - the pure conflict resolver driven by per-kind policies
//! - [`ConnectivityMonitor`] - online/offline signal with transition hooks
//! - [`Clock`] / [`CancelToken`] - injected time and cooperative shutdown
//! - [`StatusFeed`] - aggregate status snapshots for UI observers
//! - [`SyncSupervisor`] - background drain thread with wake triggers
//!
//! ## Architecture
//!
//! The engine is a **pure coordinator**: every piece of durable state lives
//! in the store crate, so a restart (or crash) loses nothing but in-flight
//! progress, and that is recovered by re-dispatching. Actions move through
//! `Pending → Syncing → { Synced | Failed | Conflict }`; `Failed` returns
//! to the pipeline on retry and `Conflict` after resolution.
//!
//! ## Key Invariants
//!
//! - At most one action per resource is in flight at a time
//! - At most `max_in_flight` actions are in flight overall
//! - The action id is the idempotency token for every gateway call
//! - Failures are never swallowed: they stay visible in [`SyncState`]
//!   counts until the user retries, clears, or resolves them
//! - Going offline never cancels an in-flight call; it only stops new
//!   dispatches
//!
//! [`SyncState`]: fieldsync_model::SyncState

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod connectivity;
mod error;
mod gateway;
mod orchestrator;
mod resolver;
mod stats;
mod status;
mod supervisor;

pub use clock::{CancelToken, Clock, ManualClock, SystemClock};
pub use config::{RetryConfig, SyncConfig};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use error::{SyncError, SyncResult};
pub use gateway::{GatewayScript, MockGateway, RemoteGateway};
pub use orchestrator::{DrainReport, SyncOrchestrator};
pub use resolver::{merge_payloads, resolve};
pub use stats::{EngineStats, StatsSnapshot};
pub use status::StatusFeed;
pub use supervisor::SyncSupervisor;
