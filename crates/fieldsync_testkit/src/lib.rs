//! # FieldSync Testkit
//!
//! Test utilities for FieldSync.
//!
//! This crate provides:
//! - Store fixtures with automatic temp-directory cleanup
//! - A crash-simulating storage backend and recovery harness
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldsync_testkit::prelude::*;
//!
//! #[test]
//! fn survives_reopen() {
//!     let harness = RecoveryHarness::new();
//!     harness.mutate(|store| {
//!         store.queue.enqueue(daily_log_create(100))?;
//!         Ok(())
//!     }).unwrap();
//!     harness.verify(|store| assert_eq!(store.queue.len(), 1));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
