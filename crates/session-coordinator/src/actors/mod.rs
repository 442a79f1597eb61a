//! Actor system for the Session Coordinator.
//!
//! ```text
//! RoomRegistryActor (singleton)
//! └── RoomActor (one per occupied session)
//!
//! ConnectionActor (one per transport link, owned by the transport)
//! ```
//!
//! Rooms hold `ConnectionActorHandle`s for their members and deliver to them
//! with non-blocking sends. Room transitions are published as [`RoomEvent`]s.

pub mod connection;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod room;

pub use connection::{ConnectionActor, ConnectionActorHandle, MessageSink};
pub use messages::{JoinOutcome, LeaveOutcome, RegistryStatus, RelayPayload, RoomEvent};
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use registry::RoomRegistryHandle;
pub use room::RoomActorHandle;
