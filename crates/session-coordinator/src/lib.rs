//! Session Coordinator Library
//!
//! Real-time coordinator for two-party tutoring sessions:
//!
//! - Authorizes joins against the session's teacher/learner pair
//! - Tracks live room membership per session
//! - Relays offer/answer/ICE/chat messages between the two participants
//! - Reports `in-progress` / `completed` to the session persistence service
//!
//! Media never flows through the coordinator; peers connect directly once
//! signaling completes.
//!
//! # Architecture
//!
//! ```text
//! RoomRegistryActor (singleton per instance)
//! └── RoomActor (one per occupied session)
//!         │ RoomEvent
//!         ▼
//!     StatusBridge ──► session persistence API
//!
//! per WebSocket link:
//!   ConnectionHandler (read side, dispatch + authorized set)
//!   ConnectionActor   (write side, outbound mailbox + pings)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Per-room serialization**: join/leave/relay for a session run on that
//!   room's actor, so empty-to-occupied is observed exactly once
//! - **Fire-and-forget fan-out**: a slow client only loses its own messages
//! - **Best-effort status**: persistence failures never affect signaling
//!
//! # Modules
//!
//! - [`actors`] - Registry, room and connection actors
//! - [`auth`] - Authorization gate and credential verification
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client-safe messages
//! - [`observability`] - Metrics and health endpoints
//! - [`sessions`] - Session persistence API client
//! - [`signaling`] - Per-connection dispatch
//! - [`status_bridge`] - Room transitions to session status
//! - [`transport`] - WebSocket listener

pub mod actors;
pub mod auth;
pub mod config;
pub mod errors;
pub mod observability;
pub mod sessions;
pub mod signaling;
pub mod status_bridge;
pub mod transport;
