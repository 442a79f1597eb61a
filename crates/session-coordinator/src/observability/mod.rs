//! Observability for the Session Coordinator.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit field
//! allow-listing. Credentials are never logged. Session and participant ids
//! appear in logs but never as metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sc_connections_active` | Gauge | none | Current WebSocket links |
//! | `sc_rooms_active` | Gauge | none | Current live rooms |
//! | `sc_room_activations_total` | Counter | none | Empty-to-occupied transitions |
//! | `sc_room_joins_total` | Counter | `result` | Join outcomes |
//! | `sc_join_duration_seconds` | Histogram | `result` | Join latency |
//! | `sc_relay_messages_total` | Counter | `kind` | Relayed signaling messages |
//! | `sc_relay_dropped_total` | Counter | `reason` | Silently dropped messages |
//! | `sc_outbound_dropped_total` | Counter | none | Per-recipient delivery drops |
//! | `sc_status_updates_total` | Counter | `status`, `result` | Status bridge calls |
//! | `sc_actor_panics_total` | Counter | `actor_type` | Actor crashes |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
