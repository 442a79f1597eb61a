//! Signaling relay.
//!
//! Routes client messages from one transport link into the room actors.
//! Transport-agnostic: the WebSocket layer feeds text frames to
//! [`ConnectionHandler::handle_text`].

pub mod handler;

pub use handler::{ConnectionHandler, SignalingContext, MALFORMED_MESSAGE};
