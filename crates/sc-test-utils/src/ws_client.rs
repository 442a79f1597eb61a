//! Raw WebSocket client for end-to-end coordinator tests.

use crate::test_connection::RECV_TIMEOUT;

use anyhow::{anyhow, Context};
use common::protocol::{ClientMessage, ServerMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON signaling client speaking the coordinator's wire protocol.
pub struct TestSignalingClient {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl TestSignalingClient {
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (socket, _response) = connect_async(url)
            .await
            .with_context(|| format!("connect to {url}"))?;
        let (sink, stream) = socket.split();
        Ok(Self { sink, stream })
    }

    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), anyhow::Error> {
        let text = serde_json::to_string(message)?;
        self.send_raw(&text).await
    }

    /// Send an arbitrary text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn send_raw(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.sink.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Next server message, skipping control frames.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, close, or an unparseable frame.
    pub async fn recv(&mut self) -> Result<ServerMessage, anyhow::Error> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for a server message"))?
                .ok_or_else(|| anyhow!("connection closed"))??;

            match frame {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(frame) => return Err(anyhow!("closed by server: {frame:?}")),
                _ => {}
            }
        }
    }

    /// Skip messages until one of `kind` arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if none arrives in time.
    pub async fn recv_kind(&mut self, kind: &str) -> Result<ServerMessage, anyhow::Error> {
        loop {
            let message = self.recv().await?;
            if message.kind() == kind {
                return Ok(message);
            }
        }
    }

    /// True when no text frame arrives within `window`.
    pub async fn is_silent_for(&mut self, window: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Err(_) | Ok(None) => return true,
                Ok(Some(Ok(Message::Text(_)))) => return false,
                Ok(Some(_)) => {}
            }
        }
    }

    /// Wait for the server to close the link.
    ///
    /// # Errors
    ///
    /// Returns an error if a text frame arrives or the link stays open.
    pub async fn expect_closed(&mut self, within: Duration) -> Result<(), anyhow::Error> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Err(_) => return Err(anyhow!("link still open")),
                Ok(None | Some(Ok(Message::Close(_)) | Err(_))) => return Ok(()),
                Ok(Some(Ok(Message::Text(text)))) => {
                    return Err(anyhow!("unexpected message: {text}"));
                }
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    /// Close the link from the client side.
    pub async fn close(mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}
