//! # SC Test Utilities
//!
//! Shared test utilities for the Session Coordinator (SC) and the peer
//! client.
//!
//! ## Modules
//!
//! - `fixtures` - Test sessions and signed participant credentials
//! - `mock_sessions` - In-memory session persistence (directory + status writer)
//! - `mock_media` - Scriptable media engine that records every call
//! - `mock_signaling` - Recording signaling sink with switchable failures
//! - `test_connection` - Connection actor wired to an in-memory sink
//! - `server_harness` - In-process services and a served test coordinator
//! - `ws_client` - Raw JSON WebSocket client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let session = TestSession::new("s1")
//!         .with_teacher("alice")
//!         .with_learner("bob");
//!     let directory = MockSessionDirectory::new().with_session(session.build());
//!
//!     let server = TestCoordinator::spawn(directory).await.unwrap();
//!     let mut alice = TestSignalingClient::connect(&server.ws_url()).await.unwrap();
//!     alice
//!         .send(&ClientMessage::Join {
//!             session_id: session.session_id(),
//!             credential: credential_for("alice"),
//!         })
//!         .await
//!         .unwrap();
//!
//!     // Run your test...
//! }
//! ```

pub mod fixtures;
pub mod mock_media;
pub mod mock_sessions;
pub mod mock_signaling;
pub mod server_harness;
pub mod test_connection;
pub mod ws_client;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_media::*;
pub use mock_sessions::*;
pub use mock_signaling::*;
pub use server_harness::*;
pub use test_connection::*;
pub use ws_client::*;
