//! rtc-signaling - WebRTC negotiation over a signaling relay
//!
//! Peers address each other by id through a relay server. Each remote peer
//! gets its own port on the shared channel, and each port drives one peer
//! connection through offer, answer and candidate exchange.

pub mod config;
pub mod signaling;
pub mod transport;
pub mod webrtc;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{Config, IceServerConfig, RtcConfig};
pub use signaling::{ChannelError, IncomingSignal, OutgoingSignal, PeerId, SignalingChannel, SignalingPort};
pub use transport::{RelayHub, WebSocketTransport};
pub use webrtc::{ConnectionFactory, OfferEvent, SignalingMessage, SignalingPeerConnection, WebRTCError};
