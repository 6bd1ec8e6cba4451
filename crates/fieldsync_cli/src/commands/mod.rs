//! CLI command implementations.

pub mod compact;
pub mod inspect;
pub mod status;
pub mod verify;
