//! Metrics definitions for the Session Coordinator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix for Session Coordinator
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `actor_type`: 3 values (registry, room, connection)
//! - `kind`: bounded by signaling message kinds (6 values)
//! - `reason`: bounded drop reasons (3 values)
//! - `result`: success/error style outcomes (≤ 6 values)
//! - `status`: target session status (2 values)
//!
//! Session and participant ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Join latency covers credential check plus session lookup
        .set_buckets_for_metric(
            Matcher::Prefix("sc_join".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set join latency buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("sc_status_update".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set status update buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Room & Connection Metrics (Gauges)
// ============================================================================

/// Set the number of active transport connections.
///
/// Metric: `sc_connections_active`
pub fn set_connections_active(count: usize) {
    // usize to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_connections_active").set(count as f64);
}

/// Set the number of active rooms.
///
/// Metric: `sc_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_rooms_active").set(count as f64);
}

/// Record an empty-to-occupied room transition.
///
/// Metric: `sc_room_activations_total`
pub fn record_room_activation() {
    counter!("sc_room_activations_total").increment(1);
}

// ============================================================================
// Join & Relay Metrics
// ============================================================================

/// Record a join attempt outcome and its latency.
///
/// Metrics: `sc_room_joins_total`, `sc_join_duration_seconds`
/// Labels: `result` (`admitted`, `unauthenticated`, `forbidden`, `not_found`, `capacity`, `error`)
pub fn record_join(result: &str, duration: Duration) {
    counter!("sc_room_joins_total", "result" => result.to_string()).increment(1);
    histogram!("sc_join_duration_seconds", "result" => result.to_string())
        .record(duration.as_secs_f64());
}

/// Record a relayed signaling message.
///
/// Metric: `sc_relay_messages_total`
/// Labels: `kind` (offer, answer, ice-candidate, chat)
pub fn record_relay(kind: &str) {
    counter!("sc_relay_messages_total", "kind" => kind.to_string()).increment(1);
}

/// Record a message silently dropped by the relay.
///
/// Metric: `sc_relay_dropped_total`
/// Labels: `reason` (`unauthorized`, `not_member`, `no_room`)
pub fn record_relay_dropped(reason: &str) {
    counter!("sc_relay_dropped_total", "reason" => reason.to_string()).increment(1);
}

/// Record an outbound message dropped for one recipient (full or closed mailbox).
///
/// Metric: `sc_outbound_dropped_total`
pub fn record_outbound_dropped() {
    counter!("sc_outbound_dropped_total").increment(1);
}

// ============================================================================
// Status Bridge Metrics
// ============================================================================

/// Record a session status update attempt.
///
/// Metrics: `sc_status_updates_total`, `sc_status_update_duration_seconds`
/// Labels: `status` (in-progress, completed), `result` (success, error, skipped)
pub fn record_status_update(status: &str, result: &str, duration: Duration) {
    counter!(
        "sc_status_updates_total",
        "status" => status.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
    if result != "skipped" {
        histogram!("sc_status_update_duration_seconds", "status" => status.to_string())
            .record(duration.as_secs_f64());
    }
}

// ============================================================================
// Actor Health
// ============================================================================

/// Record an actor panic.
///
/// Metric: `sc_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &str) {
    counter!("sc_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `sc_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // These tests execute the recording functions against whatever recorder is
    // installed (a no-op one by default); they must never panic.

    #[test]
    fn test_gauges_accept_any_count() {
        set_connections_active(0);
        set_connections_active(10_000);
        set_rooms_active(0);
        set_rooms_active(5_000);
        set_actor_mailbox_depth("room", 200);
    }

    #[test]
    fn test_counters_and_histograms() {
        record_room_activation();
        record_join("admitted", Duration::from_millis(12));
        record_join("forbidden", Duration::from_millis(3));
        record_relay("offer");
        record_relay_dropped("unauthorized");
        record_outbound_dropped();
        record_status_update("in-progress", "success", Duration::from_millis(40));
        record_status_update("completed", "skipped", Duration::ZERO);
        record_actor_panic("room");
    }

    #[test]
    fn test_metrics_reach_debugging_recorder() {
        use metrics_util::debugging::DebuggingRecorder;

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_rooms_active(3);
            record_relay("chat");
            record_relay_dropped("not_member");
            record_join("admitted", Duration::from_millis(5));
        });

        let names: Vec<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        assert!(names.iter().any(|n| n == "sc_rooms_active"));
        assert!(names.iter().any(|n| n == "sc_relay_messages_total"));
        assert!(names.iter().any(|n| n == "sc_relay_dropped_total"));
        assert!(names.iter().any(|n| n == "sc_join_duration_seconds"));
        assert!(names.iter().all(|n| n.starts_with("sc_")));
    }
}
