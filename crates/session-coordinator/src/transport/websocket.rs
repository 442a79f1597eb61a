//! WebSocket signaling transport.
//!
//! `GET /ws` upgrades to a WebSocket carrying JSON text frames. Each link gets:
//! - a `ConnectionActor` owning the write half (outbound mailbox + pings)
//! - a `ConnectionHandler` fed from the read half, one frame at a time
//!
//! A link with no inbound frame (pongs included) for the idle timeout is
//! treated as disconnected. Every exit path runs the same cleanup.

use crate::actors::{ActorMetrics, ConnectionActor, MessageSink};
use crate::errors::CoordinatorError;
use crate::observability::HealthState;
use crate::signaling::{ConnectionHandler, SignalingContext, MALFORMED_MESSAGE};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use common::protocol::ServerMessage;
use common::types::ConnectionId;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest accepted inbound frame. SDP blobs are the biggest legitimate payload.
const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Normal closure.
const CLOSE_NORMAL: u16 = 1000;

/// Shared state for the signaling listener.
#[derive(Clone)]
pub struct TransportState {
    pub context: SignalingContext,
    pub metrics: Arc<ActorMetrics>,
    pub health: Arc<HealthState>,
    pub outbound_buffer: usize,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
    /// Cancelled on shutdown; every link's actor is a child of it.
    pub cancel_token: CancellationToken,
}

/// Build the signaling router (`GET /ws`).
pub fn signaling_router(state: TransportState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(State(state): State<TransportState>, ws: WebSocketUpgrade) -> Response {
    if !state.health.is_ready() {
        return (StatusCode::SERVICE_UNAVAILABLE, "not accepting connections").into_response();
    }

    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Write half of a WebSocket link.
pub struct WebSocketSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl MessageSink for WebSocketSink {
    async fn send(&mut self, message: &ServerMessage) -> Result<(), CoordinatorError> {
        let text = serde_json::to_string(message)
            .map_err(|e| CoordinatorError::Internal(format!("encode failed: {e}")))?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| CoordinatorError::Internal(format!("websocket send failed: {e}")))
    }

    async fn ping(&mut self) -> Result<(), CoordinatorError> {
        self.sink
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| CoordinatorError::Internal(format!("websocket ping failed: {e}")))
    }

    async fn close(&mut self, reason: &str) {
        let frame = CloseFrame {
            code: CLOSE_NORMAL,
            reason: reason.to_string().into(),
        };
        let _ = self.sink.send(Message::Close(Some(frame))).await;
        let _ = self.sink.close().await;
    }
}

async fn handle_socket(socket: WebSocket, state: TransportState) {
    let (sink, mut stream) = socket.split();
    let connection_id = ConnectionId::new();

    let (connection, task_handle) = ConnectionActor::spawn(
        connection_id,
        Box::new(WebSocketSink { sink }),
        state.outbound_buffer,
        state.ping_interval,
        state.cancel_token.child_token(),
        Arc::clone(&state.metrics),
    );
    let mut handler = ConnectionHandler::new(connection, state.context.clone());

    debug!(
        target: "sc.transport.ws",
        connection_id = %connection_id,
        "WebSocket connected"
    );

    let reason = loop {
        let frame = tokio::select! {
            () = state.cancel_token.cancelled() => break "shutdown",
            frame = tokio::time::timeout(state.idle_timeout, stream.next()) => frame,
        };

        match frame {
            Err(_) => break "idle timeout",
            Ok(None) => break "closed by peer",
            Ok(Some(Err(e))) => {
                debug!(
                    target: "sc.transport.ws",
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket read failed"
                );
                break "read error";
            }
            Ok(Some(Ok(Message::Text(text)))) => handler.handle_text(&text).await,
            Ok(Some(Ok(Message::Binary(_)))) => handler.reject_frame(MALFORMED_MESSAGE).await,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(Some(Ok(Message::Close(_)))) => break "closed by peer",
        }
    };

    handler.disconnect().await;

    if let Err(e) = task_handle.await {
        warn!(
            target: "sc.transport.ws",
            connection_id = %connection_id,
            error = ?e,
            "Connection actor ended abnormally"
        );
    }

    info!(
        target: "sc.transport.ws",
        connection_id = %connection_id,
        identity = ?handler.identity(),
        reason,
        "WebSocket disconnected"
    );
}
