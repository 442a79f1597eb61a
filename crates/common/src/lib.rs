//! Common types shared by the session coordinator and peer clients.

#![warn(clippy::pedantic)]

/// Module for identifiers and the persisted session model
pub mod types;

/// Module for the signaling wire protocol
pub mod protocol;

/// Module for deterministic offerer election
pub mod election;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for credential (JWT) utilities
pub mod jwt;
