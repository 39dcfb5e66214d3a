//! Relay transports
//!
//! Handles WebSocket connections to a relay server, the relay server itself,
//! and an in-process relay for embedding and tests.

pub mod hub;
pub mod local;
pub mod signaling_server;
pub mod websocket;

pub use hub::{RelayHub, RouteOutcome};
pub use local::LocalTransport;
pub use signaling_server::{router, run_relay_server};
pub use websocket::WebSocketTransport;
