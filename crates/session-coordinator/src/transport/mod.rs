//! Client-facing transports.

pub mod websocket;

pub use websocket::{signaling_router, TransportState, WebSocketSink};
