//! Signaling links.
//!
//! Outbound messages go through a [`SignalingSink`]; inbound traffic arrives
//! as [`SignalingEvent`]s on a channel that outlives reconnects, so the peer
//! loop never has to swap receivers.

use crate::errors::PeerError;

use common::protocol::{ClientMessage, ServerMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Inbound buffer between the socket reader and the peer loop.
const INBOUND_BUFFER: usize = 256;

/// Inbound signaling traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    Message(ServerMessage),
    /// The link dropped. The peer loop schedules a reconnect.
    Disconnected,
}

/// Outbound half of a signaling link.
#[async_trait::async_trait]
pub trait SignalingSink: Send {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), PeerError>;

    /// Re-establish the link. Inbound events keep arriving on the original
    /// channel.
    async fn reconnect(&mut self) -> Result<(), PeerError>;

    async fn close(&mut self);
}

/// In-process link backed by an unbounded channel.
pub struct ChannelSignaling {
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl ChannelSignaling {
    /// Create a link and the receiver observing everything sent on it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { outbound }, rx)
    }
}

#[async_trait::async_trait]
impl SignalingSink for ChannelSignaling {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), PeerError> {
        self.outbound
            .send(message.clone())
            .map_err(|_| PeerError::Signaling("channel closed".to_string()))
    }

    async fn reconnect(&mut self) -> Result<(), PeerError> {
        if self.outbound.is_closed() {
            return Err(PeerError::Signaling("channel closed".to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) {}
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket link to the coordinator's `/ws` endpoint.
pub struct WebSocketSignaling {
    url: String,
    sink: Option<SplitSink<WsStream, Message>>,
    events: mpsc::Sender<SignalingEvent>,
    reader: Option<JoinHandle<()>>,
}

impl WebSocketSignaling {
    /// Connect to `url` (e.g. `ws://host:4000/ws`).
    ///
    /// Returns the link and the receiver for inbound events.
    ///
    /// # Errors
    ///
    /// Returns `PeerError::Signaling` if the WebSocket handshake fails.
    pub async fn connect(
        url: impl Into<String>,
    ) -> Result<(Self, mpsc::Receiver<SignalingEvent>), PeerError> {
        let (events, rx) = mpsc::channel(INBOUND_BUFFER);
        let mut link = Self {
            url: url.into(),
            sink: None,
            events,
            reader: None,
        };
        link.open().await?;
        Ok((link, rx))
    }

    async fn open(&mut self) -> Result<(), PeerError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| PeerError::Signaling(format!("connect failed: {e}")))?;
        let (sink, stream) = stream.split();

        if let Some(previous) = self.reader.take() {
            previous.abort();
        }
        self.reader = Some(tokio::spawn(read_frames(stream, self.events.clone())));
        self.sink = Some(sink);

        info!(target: "peer.signaling", url = %self.url, "Signaling link open");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SignalingSink for WebSocketSignaling {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), PeerError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| PeerError::Signaling("link not open".to_string()))?;
        let text = serde_json::to_string(message)
            .map_err(|e| PeerError::Signaling(format!("encode failed: {e}")))?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| PeerError::Signaling(format!("send failed: {e}")))
    }

    async fn reconnect(&mut self) -> Result<(), PeerError> {
        // The old reader must not report the close below as a fresh drop
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
        self.open().await
    }

    async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_frames(mut stream: SplitStream<WsStream>, events: mpsc::Sender<SignalingEvent>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => {
                    if events.send(SignalingEvent::Message(message)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(target: "peer.signaling", error = %e, "Unparseable server frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(target: "peer.signaling", error = %e, "Signaling read failed");
                break;
            }
        }
    }

    let _ = events.send(SignalingEvent::Disconnected).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::SessionId;

    #[tokio::test]
    async fn test_channel_signaling_forwards_messages() {
        let (mut link, mut rx) = ChannelSignaling::new();
        let message = ClientMessage::Chat {
            session_id: SessionId::from("s1"),
            message: "hi".to_string(),
        };

        link.send(&message).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), message);
        assert!(link.reconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_channel_signaling_fails_once_receiver_is_gone() {
        let (mut link, rx) = ChannelSignaling::new();
        drop(rx);

        let message = ClientMessage::Leave {
            session_id: SessionId::from("s1"),
            end_call: false,
        };
        assert!(matches!(
            link.send(&message).await,
            Err(PeerError::Signaling(_))
        ));
        assert!(link.reconnect().await.is_err());
    }

    #[tokio::test]
    async fn test_websocket_connect_failure_is_signaling_error() {
        // Nothing listens on port 1
        let result = WebSocketSignaling::connect("ws://127.0.0.1:1/ws").await;
        assert!(matches!(result, Err(PeerError::Signaling(_))));
    }
}
