//! Session Coordinator
//!
//! WebSocket signaling relay for two-party tutoring sessions.
//!
//! # Servers
//!
//! - WebSocket server for client signaling (default: 0.0.0.0:4000)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Build the session API client and authorization gate
//! 4. Spawn the status bridge and room registry
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Start the signaling listener and mark ready
//! 7. Wait for shutdown signal, drain, stop

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use session_coordinator::actors::{ActorMetrics, RoomRegistryHandle};
use session_coordinator::auth::{AuthorizationGate, JwtCredentialVerifier};
use session_coordinator::config::Config;
use session_coordinator::observability::{health_router, init_metrics_recorder, HealthState};
use session_coordinator::sessions::{SessionApiClient, SessionDirectory};
use session_coordinator::signaling::SignalingContext;
use session_coordinator::status_bridge::StatusBridge;
use session_coordinator::transport::{signaling_router, TransportState};
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often shutdown checks whether all rooms have drained.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first: it decides the log format
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "session_coordinator=debug,tower_http=debug".into());
    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Session Coordinator");
    info!(
        sc_id = %config.sc_id,
        signaling_bind_address = %config.signaling_bind_address,
        health_bind_address = %config.health_bind_address,
        session_api_url = %config.session_api_url,
        max_rooms = config.max_rooms,
        idle_timeout_seconds = config.idle_timeout.as_secs(),
        ping_interval_seconds = config.ping_interval.as_secs(),
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    // This must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Session persistence client doubles as directory and status writer
    let session_api = Arc::new(
        SessionApiClient::new(
            config.session_api_url.clone(),
            config.session_api_token.clone(),
        )
        .map_err(|e| {
            error!(error = %e, "Failed to build session API client");
            e
        })?,
    );

    let directory: Arc<dyn SessionDirectory> = session_api.clone();
    let gate = AuthorizationGate::new(
        Arc::new(JwtCredentialVerifier::new(
            &config.jwt_secret,
            config.clock_skew,
        )),
        directory,
    );

    // Initialize actor system
    let actor_metrics = ActorMetrics::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let registry = RoomRegistryHandle::new(
        config.sc_id.clone(),
        config.max_rooms,
        events_tx,
        Arc::clone(&actor_metrics),
    );

    // Everything below stops with the registry
    let shutdown_token = registry.child_token();

    let (bridge, bridge_task) =
        StatusBridge::spawn(events_rx, session_api, shutdown_token.child_token());
    info!("Actor system initialized");

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_app = health_router(Arc::clone(&health_state), Some(prometheus_handle));

    // Bind listener BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start signaling server
    let signaling_addr: SocketAddr = config.signaling_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.signaling_bind_address, "Invalid signaling bind address");
        format!("Invalid signaling bind address: {e}")
    })?;

    let transport_state = TransportState {
        context: SignalingContext {
            gate,
            registry: registry.clone(),
            bridge,
        },
        metrics: Arc::clone(&actor_metrics),
        health: Arc::clone(&health_state),
        outbound_buffer: config.outbound_buffer,
        ping_interval: config.ping_interval,
        idle_timeout: config.idle_timeout,
        cancel_token: shutdown_token.child_token(),
    };
    let signaling_app = signaling_router(transport_state).layer(TraceLayer::new_for_http());

    let signaling_listener = tokio::net::TcpListener::bind(signaling_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %signaling_addr, "Failed to bind signaling server");
            format!("Failed to bind signaling server to {signaling_addr}: {e}")
        })?;

    let signaling_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %signaling_addr, "Signaling server starting");
        let server = axum::serve(signaling_listener, signaling_app).with_graceful_shutdown(
            async move {
                signaling_shutdown_token.cancelled().await;
                info!("Signaling server shutting down");
            },
        );
        if let Err(e) = server.await {
            error!(error = %e, "Signaling server failed");
        }
    });

    health_state.set_ready();
    info!("Session Coordinator running - press Ctrl+C to shutdown");

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending new links
    health_state.start_draining();

    // Stop creating rooms, then give live rooms the grace period to empty
    if let Err(e) = registry.shutdown().await {
        warn!(error = %e, "Registry drain request failed");
    }
    let drained = tokio::time::timeout(config.shutdown_grace, async {
        loop {
            match registry.status().await {
                Ok(status) if status.room_count > 0 => {
                    tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
                }
                _ => break,
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            grace_seconds = config.shutdown_grace.as_secs(),
            rooms = actor_metrics.room_count(),
            "Shutdown grace period elapsed with rooms still active"
        );
    }

    // Cancel registry, rooms, connections, bridge and servers
    registry.cancel();

    if tokio::time::timeout(config.shutdown_grace, bridge_task)
        .await
        .is_err()
    {
        warn!("Status bridge did not stop in time");
    }

    info!("Session Coordinator shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
