//! Signaling relay layer
//!
//! This module provides the peer-addressed message plumbing:
//! - Envelope framing for the relay wire format
//! - A channel to a signaling server
//! - Ports scoping a channel to a single remote peer

pub mod channel;
pub mod envelope;
pub mod event;
pub mod port;

pub use channel::{CloseInfo, RelayTransport, SignalingChannel, WeakSignalingChannel};
pub use envelope::{IncomingSignal, OutgoingSignal};
pub use event::{EventSlot, ListenerId};
pub use port::{PortMessage, SignalingPort};

use std::error::Error;
use std::fmt;

/// Id of a peer on a signaling network
pub type PeerId = String;

/// Signaling channel errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The underlying relay transport failed
    Transport(String),
    /// The channel is closed
    Closed,
    /// A payload could not be serialized
    Serialization(String),
    /// Another connection already uses this peer id on the relay
    PeerIdTaken(PeerId),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ChannelError::Closed => write!(f, "Signaling channel is closed"),
            ChannelError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ChannelError::PeerIdTaken(id) => write!(f, "Peer id already connected: {}", id),
        }
    }
}

impl Error for ChannelError {}
