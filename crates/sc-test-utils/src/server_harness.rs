//! Coordinator harnesses.
//!
//! - [`TestContext`] wires the gate, registry and status bridge in-process,
//!   for driving `ConnectionHandler`s directly
//! - [`TestCoordinator`] additionally serves the signaling router on
//!   `127.0.0.1:0` for end-to-end WebSocket tests

use crate::fixtures::test_jwt_secret;
use crate::mock_sessions::MockSessionDirectory;

use common::jwt::DEFAULT_CLOCK_SKEW;
use session_coordinator::actors::{ActorMetrics, RoomRegistryHandle};
use session_coordinator::auth::{AuthorizationGate, JwtCredentialVerifier};
use session_coordinator::observability::HealthState;
use session_coordinator::signaling::SignalingContext;
use session_coordinator::status_bridge::{StatusBridge, StatusBridgeHandle};
use session_coordinator::transport::{signaling_router, TransportState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Room capacity used by the harnesses.
pub const TEST_MAX_ROOMS: usize = 100;

/// In-process coordinator services backed by a [`MockSessionDirectory`].
pub struct TestContext {
    pub context: SignalingContext,
    pub registry: RoomRegistryHandle,
    pub bridge: StatusBridgeHandle,
    pub metrics: Arc<ActorMetrics>,
    pub directory: MockSessionDirectory,
    bridge_task: JoinHandle<()>,
}

impl TestContext {
    /// Build the services with [`TEST_MAX_ROOMS`] capacity.
    pub fn new(directory: MockSessionDirectory) -> Self {
        Self::with_max_rooms(directory, TEST_MAX_ROOMS)
    }

    pub fn with_max_rooms(directory: MockSessionDirectory, max_rooms: usize) -> Self {
        let metrics = ActorMetrics::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = RoomRegistryHandle::new(
            "sc-test".to_string(),
            max_rooms,
            events_tx,
            Arc::clone(&metrics),
        );

        let (bridge, bridge_task) = StatusBridge::spawn(
            events_rx,
            Arc::new(directory.clone()),
            registry.child_token(),
        );

        let gate = AuthorizationGate::new(
            Arc::new(JwtCredentialVerifier::new(
                &test_jwt_secret(),
                DEFAULT_CLOCK_SKEW,
            )),
            Arc::new(directory.clone()),
        );

        let context = SignalingContext {
            gate,
            registry: registry.clone(),
            bridge: bridge.clone(),
        };

        Self {
            context,
            registry,
            bridge,
            metrics,
            directory,
            bridge_task,
        }
    }

    /// Whether the status bridge task is still running.
    pub fn bridge_running(&self) -> bool {
        !self.bridge_task.is_finished()
    }

    /// Stop the registry, every room and the bridge.
    pub fn shutdown(&self) {
        self.registry.cancel();
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.registry.cancel();
    }
}

/// Test harness serving the signaling endpoint on a random local port.
///
/// # Example
/// ```rust,ignore
/// let session = TestSession::new("s1").with_teacher("alice").with_learner("bob");
/// let directory = MockSessionDirectory::new().with_session(session.build());
/// let server = TestCoordinator::spawn(directory).await?;
///
/// let mut client = TestSignalingClient::connect(&server.ws_url()).await?;
/// ```
pub struct TestCoordinator {
    addr: SocketAddr,
    services: TestContext,
    health: Arc<HealthState>,
    _server: JoinHandle<()>,
}

impl TestCoordinator {
    /// Spawn a coordinator with default link settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn spawn(directory: MockSessionDirectory) -> Result<Self, anyhow::Error> {
        Self::spawn_with_idle_timeout(directory, Duration::from_secs(30)).await
    }

    /// Spawn a coordinator whose links time out after `idle_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn spawn_with_idle_timeout(
        directory: MockSessionDirectory,
        idle_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let services = TestContext::new(directory);
        let health = Arc::new(HealthState::new());

        let state = TransportState {
            context: services.context.clone(),
            metrics: Arc::clone(&services.metrics),
            health: Arc::clone(&health),
            outbound_buffer: 64,
            ping_interval: Duration::from_secs(3600),
            idle_timeout,
            cancel_token: services.registry.child_token(),
        };
        let app = signaling_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let shutdown = services.registry.child_token();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .expect("test signaling server failed");
        });

        health.set_ready();

        Ok(Self {
            addr,
            services,
            health,
            _server: server,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL of the signaling endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn registry(&self) -> &RoomRegistryHandle {
        &self.services.registry
    }

    pub fn directory(&self) -> &MockSessionDirectory {
        &self.services.directory
    }

    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.services.metrics
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }
}
