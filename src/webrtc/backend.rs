//! Peer connection capabilities consumed by the negotiation layer
//!
//! [`RtcPeer`] is the subset of an `RTCPeerConnection` the signaling state
//! machine drives; [`PeerConnector`] creates one per negotiation from the
//! factory's current configuration.

use super::types::{IceCandidate, IceConnectionState, RemoteDataChannel, RemoteTrack, SessionDescription};
use super::WebRTCError;
use crate::config::RtcConfig;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Callback for locally gathered ICE candidates, `None` when gathering ends
pub type IceCandidateCallback = Box<dyn Fn(Option<IceCandidate>) + Send + Sync>;

/// Callback for ICE connection state changes
pub type IceStateCallback = Box<dyn Fn(IceConnectionState) + Send + Sync>;

/// Callback for tracks added by the remote peer
pub type TrackCallback = Box<dyn Fn(RemoteTrack) + Send + Sync>;

/// Callback for data channels opened by the remote peer
pub type DataChannelCallback = Box<dyn Fn(RemoteDataChannel) + Send + Sync>;

/// An underlying real-time peer connection
#[async_trait]
pub trait RtcPeer: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, WebRTCError>;

    async fn create_answer(&self) -> Result<SessionDescription, WebRTCError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), WebRTCError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), WebRTCError>;

    /// Add a remote candidate; `None` marks the end of remote candidates
    async fn add_ice_candidate(&self, candidate: Option<IceCandidate>) -> Result<(), WebRTCError>;

    /// Register the local candidate callback (replaces any previous one)
    fn on_ice_candidate(&self, callback: IceCandidateCallback);

    /// Register the ICE state callback (replaces any previous one)
    fn on_ice_connection_state_change(&self, callback: IceStateCallback);

    /// Register the remote track callback (replaces any previous one)
    fn on_track(&self, callback: TrackCallback);

    /// Register the remote data channel callback (replaces any previous one)
    fn on_data_channel(&self, callback: DataChannelCallback);

    async fn close(&self) -> Result<(), WebRTCError>;

    /// Access to the concrete connection type
    fn as_any(&self) -> &dyn Any;
}

/// Creates peer connections for a factory
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, config: &RtcConfig) -> Result<Arc<dyn RtcPeer>, WebRTCError>;
}
