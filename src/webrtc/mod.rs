//! WebRTC negotiation over a signaling relay
//!
//! This module provides:
//! - The offer/answer/candidate message format
//! - Signaling-driven peer connections
//! - A factory arbitrating unsolicited offers
//! - A webrtc-rs backed peer connection (feature `webrtc-backend`)

pub mod backend;
pub mod factory;
pub mod session;
pub mod signaling;
pub mod types;

#[cfg(feature = "webrtc-backend")]
pub mod peer_connection;

pub use backend::{PeerConnector, RtcPeer};
pub use factory::{ConnectionFactory, OfferEvent};
pub use session::{Entry, SignalingPeerConnection};
pub use signaling::SignalingMessage;
pub use types::{
    IceCandidate, IceConnectionState, NegotiationState, RemoteDataChannel, RemoteTrack, SdpType,
    SessionDescription, TrackKind,
};

#[cfg(feature = "webrtc-backend")]
pub use peer_connection::{WebRtcConnector, WebRtcPeer};

use crate::signaling::{ChannelError, PeerId};
use std::error::Error;
use std::fmt;

/// WebRTC-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebRTCError {
    /// Peer connection creation or teardown failed
    ConnectionFailed(String),
    /// SDP processing failed
    SdpError(String),
    /// ICE candidate processing failed
    IceError(String),
    /// The signaling channel rejected a message
    Signaling(ChannelError),
    /// The offer was already accepted
    AlreadyAccepted(PeerId),
    /// A connection with the peer is already registered
    AlreadyConnected(PeerId),
    /// The factory that raised the offer no longer exists
    FactoryClosed,
}

impl fmt::Display for WebRTCError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebRTCError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            WebRTCError::SdpError(msg) => write!(f, "SDP error: {}", msg),
            WebRTCError::IceError(msg) => write!(f, "ICE error: {}", msg),
            WebRTCError::Signaling(e) => write!(f, "Signaling error: {}", e),
            WebRTCError::AlreadyAccepted(peer) => write!(f, "Offer from {} was already accepted", peer),
            WebRTCError::AlreadyConnected(peer) => write!(f, "Already connected to {}", peer),
            WebRTCError::FactoryClosed => write!(f, "Connection factory was dropped"),
        }
    }
}

impl Error for WebRTCError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WebRTCError::Signaling(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChannelError> for WebRTCError {
    fn from(e: ChannelError) -> Self {
        WebRTCError::Signaling(e)
    }
}
