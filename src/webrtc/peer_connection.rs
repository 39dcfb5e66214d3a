//! WebRTC PeerConnection backend
//!
//! Implements [`RtcPeer`] on top of a webrtc-rs `RTCPeerConnection`.
//! Data channels created locally or opened by the remote peer stay
//! reachable through [`WebRtcPeer::data_channel`].

use super::backend::{
    DataChannelCallback, IceCandidateCallback, IceStateCallback, PeerConnector, RtcPeer, TrackCallback,
};
use super::types::{
    IceCandidate, IceConnectionState, RemoteDataChannel, RemoteTrack, SdpType, SessionDescription,
    TrackKind,
};
use super::WebRTCError;
use crate::config::{IceServerConfig, RtcConfig};
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Creates webrtc-rs peer connections
#[derive(Debug, Default, Clone)]
pub struct WebRtcConnector;

impl WebRtcConnector {
    pub fn new() -> Self {
        Self
    }

    /// Create a new PeerConnection with the given settings
    pub async fn create_peer_connection(
        &self,
        config: &RtcConfig,
    ) -> Result<Arc<RTCPeerConnection>, WebRTCError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| WebRTCError::ConnectionFailed(format!("Failed to register codecs: {}", e)))?;

        // Create interceptor registry for RTCP feedback
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| WebRTCError::ConnectionFailed(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config.ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };

        let peer_connection = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| WebRTCError::ConnectionFailed(format!("Failed to create peer connection: {}", e)))?;

        Ok(Arc::new(peer_connection))
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(&self, config: &RtcConfig) -> Result<Arc<dyn RtcPeer>, WebRTCError> {
        let peer = WebRtcPeer::new(self.create_peer_connection(config).await?);

        // Data channels must exist before the first offer to be negotiated
        for label in &config.data_channels {
            peer.create_data_channel(label).await?;
        }

        Ok(Arc::new(peer))
    }
}

/// [`RtcPeer`] backed by an `RTCPeerConnection`
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    data_channels: Arc<Mutex<Vec<Arc<RTCDataChannel>>>>,
    remote_tracks: Arc<Mutex<Vec<Arc<TrackRemote>>>>,
}

impl WebRtcPeer {
    pub fn new(pc: Arc<RTCPeerConnection>) -> Self {
        let peer = Self {
            pc,
            data_channels: Arc::new(Mutex::new(Vec::new())),
            remote_tracks: Arc::new(Mutex::new(Vec::new())),
        };
        peer.install_track_handler(None);
        peer.install_data_channel_handler(None);
        peer
    }

    /// The wrapped connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    /// Create a data channel; it is negotiated with the next offer
    pub async fn create_data_channel(&self, label: &str) -> Result<Arc<RTCDataChannel>, WebRTCError> {
        let channel = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(|e| WebRTCError::ConnectionFailed(format!("Failed to create data channel {}: {}", label, e)))?;
        debug!("Created data channel {}", label);
        self.data_channels.lock().push(channel.clone());
        Ok(channel)
    }

    /// A local or remote data channel by label
    pub fn data_channel(&self, label: &str) -> Option<Arc<RTCDataChannel>> {
        self.data_channels
            .lock()
            .iter()
            .find(|channel| channel.label() == label)
            .cloned()
    }

    /// All local and remote data channels
    pub fn data_channels(&self) -> Vec<Arc<RTCDataChannel>> {
        self.data_channels.lock().clone()
    }

    /// Tracks received from the remote peer
    pub fn remote_tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.remote_tracks.lock().clone()
    }

    fn install_track_handler(&self, callback: Option<Arc<dyn Fn(RemoteTrack) + Send + Sync>>) {
        let tracks = self.remote_tracks.clone();
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            tracks.lock().push(track.clone());
            let callback = callback.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => {
                        warn!("Ignoring remote track {} of unspecified kind", track.id());
                        return;
                    }
                };
                if let Some(callback) = callback {
                    callback(RemoteTrack {
                        id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                    });
                }
            })
        }));
    }

    fn install_data_channel_handler(&self, callback: Option<Arc<dyn Fn(RemoteDataChannel) + Send + Sync>>) {
        let channels = self.data_channels.clone();
        self.pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            channels.lock().push(channel.clone());
            let callback = callback.clone();
            Box::pin(async move {
                if let Some(callback) = callback {
                    callback(RemoteDataChannel {
                        label: channel.label().to_string(),
                        id: channel.id(),
                    });
                }
            })
        }));
    }
}

#[async_trait]
impl RtcPeer for WebRtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription, WebRTCError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| WebRTCError::SdpError(format!("Failed to create offer: {}", e)))?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, WebRTCError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| WebRTCError::SdpError(format!("Failed to create answer: {}", e)))?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), WebRTCError> {
        self.pc
            .set_local_description(to_rtc_description(description)?)
            .await
            .map_err(|e| WebRTCError::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), WebRTCError> {
        self.pc
            .set_remote_description(to_rtc_description(description)?)
            .await
            .map_err(|e| WebRTCError::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: Option<IceCandidate>) -> Result<(), WebRTCError> {
        // webrtc-rs has no end-of-candidates signal
        let Some(candidate) = candidate else {
            return Ok(());
        };

        let candidate_init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(candidate_init)
            .await
            .map_err(|e| WebRTCError::IceError(format!("Failed to add ICE candidate: {}", e)))
    }

    fn on_ice_candidate(&self, callback: IceCandidateCallback) {
        let callback: Arc<dyn Fn(Option<IceCandidate>) + Send + Sync> = Arc::from(callback);
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            let callback = callback.clone();
            Box::pin(async move {
                let candidate = match candidate {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => Some(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }),
                        Err(e) => {
                            warn!("Failed to serialize local ICE candidate: {}", e);
                            return;
                        }
                    },
                    None => None,
                };
                callback(candidate);
            })
        }));
    }

    fn on_ice_connection_state_change(&self, callback: IceStateCallback) {
        let callback: Arc<dyn Fn(IceConnectionState) + Send + Sync> = Arc::from(callback);
        self.pc.on_ice_connection_state_change(Box::new(move |state| {
            let callback = callback.clone();
            Box::pin(async move {
                if let Some(state) = from_rtc_ice_state(state) {
                    callback(state);
                }
            })
        }));
    }

    fn on_track(&self, callback: TrackCallback) {
        self.install_track_handler(Some(Arc::from(callback)));
    }

    fn on_data_channel(&self, callback: DataChannelCallback) {
        self.install_data_channel_handler(Some(Arc::from(callback)));
    }

    async fn close(&self) -> Result<(), WebRTCError> {
        self.pc
            .close()
            .await
            .map_err(|e| WebRTCError::ConnectionFailed(format!("Failed to close connection: {}", e)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn to_rtc_ice_server(server: &IceServerConfig) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, WebRTCError> {
    let sdp = description.sdp;
    let converted = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback => {
            return Err(WebRTCError::SdpError("Rollback descriptions are not supported".to_string()))
        }
    };
    converted.map_err(|e| WebRTCError::SdpError(format!("Invalid SDP {}: {}", description.sdp_type.as_str(), e)))
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription, WebRTCError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(WebRTCError::SdpError("Unspecified SDP type".to_string()))
        }
    };
    Ok(SessionDescription { sdp_type, sdp: description.sdp })
}

fn from_rtc_ice_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        RTCIceConnectionState::Unspecified => None,
    }
}
