//! Actor metrics and mailbox monitoring.
//!
//! [`ActorMetrics`] holds the live room and connection counts that the
//! registry's capacity check and status queries read; every change is
//! mirrored into the Prometheus gauges in [`crate::observability::metrics`].
//! [`MailboxMonitor`] logs when an actor falls behind its mailbox.

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which actor a monitor or panic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    Registry,
    Room,
    Connection,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Registry => "registry",
            ActorType::Room => "room",
            ActorType::Connection => "connection",
        }
    }

    /// `(elevated, critical)` mailbox depths.
    #[must_use]
    pub const fn mailbox_thresholds(&self) -> (usize, usize) {
        match self {
            ActorType::Registry => (100, 500),
            ActorType::Room | ActorType::Connection => (50, 200),
        }
    }
}

/// Tracks how far an actor's mailbox has backed up.
///
/// Senders call [`record_enqueue`](Self::record_enqueue); the actor calls
/// [`record_dequeue`](Self::record_dequeue) as it takes each message.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    /// Session id for rooms, connection id for links.
    actor_id: String,
    depth: AtomicUsize,
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        let (elevated, critical) = self.actor_type.mailbox_thresholds();

        if depth > critical {
            warn!(
                target: "sc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth,
                "Mailbox depth critical"
            );
        } else if depth == elevated + 1 {
            debug!(
                target: "sc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth,
                "Mailbox depth elevated"
            );
        }
    }

    pub fn record_dequeue(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            });
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// An outbound message was discarded because the mailbox was full.
    pub fn record_drop(&self) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            target: "sc.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped,
            "Mailbox full, message dropped"
        );
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Aggregated metrics for the actor system.
///
/// Shared by every actor; counters are lock-free.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Rooms currently active.
    pub active_rooms: AtomicUsize,
    /// Connections currently active.
    pub active_connections: AtomicUsize,
    /// Empty-to-occupied room transitions.
    pub room_activations: AtomicU64,
    pub actor_panics: AtomicU64,
    /// Across all actors.
    pub messages_processed: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A room actor was spawned.
    pub fn room_created(&self) {
        let rooms = self.active_rooms.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_rooms_active(rooms);
    }

    /// A room actor was removed from the registry.
    pub fn room_removed(&self) {
        let rooms = self
            .active_rooms
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        prom::set_rooms_active(rooms);
    }

    /// A room went from empty to occupied.
    pub fn room_activated(&self) {
        self.room_activations.fetch_add(1, Ordering::Relaxed);
        prom::record_room_activation();
    }

    /// A transport connection was accepted.
    pub fn connection_created(&self) {
        let connections = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_connections_active(connections);
    }

    /// A transport connection went away.
    pub fn connection_closed(&self) {
        let connections = self
            .active_connections
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        prom::set_connections_active(connections);
    }

    /// A child actor task ended in a panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        let total = self.actor_panics.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "sc.actor.panic",
            actor_type = actor_type.as_str(),
            total,
            "Actor task panicked"
        );
    }

    pub fn record_message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.active_rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn activation_count(&self) -> u64 {
        self.room_activations.load(Ordering::Relaxed)
    }
}
