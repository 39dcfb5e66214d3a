//! Test doubles shared by the unit tests

use crate::config::RtcConfig;
use crate::signaling::{ChannelError, RelayTransport};
use crate::webrtc::backend::{
    DataChannelCallback, IceCandidateCallback, IceStateCallback, PeerConnector, RtcPeer, TrackCallback,
};
use crate::webrtc::types::{
    IceCandidate, IceConnectionState, RemoteDataChannel, RemoteTrack, SessionDescription,
};
use crate::webrtc::WebRTCError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    wait_for(Duration::from_secs(2), condition).await
}

/// Poll `condition` every 5ms until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Relay transport recording every frame sent through it
#[derive(Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sent frames parsed as JSON
    pub fn envelopes(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// `data` of every envelope addressed to `peer`
    pub fn data_to(&self, peer: &str) -> Vec<Value> {
        self.envelopes()
            .into_iter()
            .filter(|envelope| envelope["to"] == peer)
            .map(|envelope| envelope["data"].clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RelayTransport for RecordingTransport {
    fn send(&self, frame: String) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A call made on [`MockPeer`]
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(Option<IceCandidate>),
    Close,
}

/// Scripted peer connection; records successful calls
#[derive(Default)]
pub struct MockPeer {
    calls: Mutex<Vec<PeerCall>>,
    fail_set_remote: AtomicBool,
    candidate_callback: Mutex<Option<Arc<dyn Fn(Option<IceCandidate>) + Send + Sync>>>,
    state_callback: Mutex<Option<Arc<dyn Fn(IceConnectionState) + Send + Sync>>>,
    track_callback: Mutex<Option<Arc<dyn Fn(RemoteTrack) + Send + Sync>>>,
    data_channel_callback: Mutex<Option<Arc<dyn Fn(RemoteDataChannel) + Send + Sync>>>,
}

impl MockPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().clone()
    }

    pub fn fail_set_remote(&self, fail: bool) {
        self.fail_set_remote.store(fail, Ordering::SeqCst);
    }

    /// Act as if a local candidate was gathered
    pub fn emit_candidate(&self, candidate: Option<IceCandidate>) {
        let callback = self.candidate_callback.lock().clone();
        if let Some(callback) = callback {
            callback(candidate);
        }
    }

    /// Act as if the ICE connection state changed
    pub fn set_ice_state(&self, state: IceConnectionState) {
        let callback = self.state_callback.lock().clone();
        if let Some(callback) = callback {
            callback(state);
        }
    }

    /// Act as if the remote peer added a track
    pub fn emit_track(&self, track: RemoteTrack) {
        let callback = self.track_callback.lock().clone();
        if let Some(callback) = callback {
            callback(track);
        }
    }

    /// Act as if the remote peer opened a data channel
    pub fn emit_data_channel(&self, channel: RemoteDataChannel) {
        let callback = self.data_channel_callback.lock().clone();
        if let Some(callback) = callback {
            callback(channel);
        }
    }

    fn record(&self, call: PeerCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl RtcPeer for MockPeer {
    async fn create_offer(&self) -> Result<SessionDescription, WebRTCError> {
        self.record(PeerCall::CreateOffer);
        Ok(SessionDescription::offer("mock-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, WebRTCError> {
        self.record(PeerCall::CreateAnswer);
        Ok(SessionDescription::answer("mock-answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), WebRTCError> {
        self.record(PeerCall::SetLocal(description));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), WebRTCError> {
        if self.fail_set_remote.load(Ordering::SeqCst) {
            return Err(WebRTCError::SdpError("scripted failure".to_string()));
        }
        self.record(PeerCall::SetRemote(description));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: Option<IceCandidate>) -> Result<(), WebRTCError> {
        self.record(PeerCall::AddCandidate(candidate));
        Ok(())
    }

    fn on_ice_candidate(&self, callback: IceCandidateCallback) {
        *self.candidate_callback.lock() = Some(Arc::from(callback));
    }

    fn on_ice_connection_state_change(&self, callback: IceStateCallback) {
        *self.state_callback.lock() = Some(Arc::from(callback));
    }

    fn on_track(&self, callback: TrackCallback) {
        *self.track_callback.lock() = Some(Arc::from(callback));
    }

    fn on_data_channel(&self, callback: DataChannelCallback) {
        *self.data_channel_callback.lock() = Some(Arc::from(callback));
    }

    async fn close(&self) -> Result<(), WebRTCError> {
        self.record(PeerCall::Close);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Connector handing out [`MockPeer`]s
#[derive(Default)]
pub struct MockConnector {
    peers: Mutex<Vec<Arc<MockPeer>>>,
    configs: Mutex<Vec<RtcConfig>>,
    failures: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of peers created so far
    pub fn count(&self) -> usize {
        self.peers.lock().len()
    }

    /// The `index`th peer created
    pub fn peer(&self, index: usize) -> Arc<MockPeer> {
        self.peers.lock()[index].clone()
    }

    pub fn configs(&self) -> Vec<RtcConfig> {
        self.configs.lock().clone()
    }

    /// Make the next `count` connects fail
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn connect(&self, config: &RtcConfig) -> Result<Arc<dyn RtcPeer>, WebRTCError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(WebRTCError::ConnectionFailed("scripted failure".to_string()));
        }
        let peer = Arc::new(MockPeer::new());
        self.peers.lock().push(peer.clone());
        self.configs.lock().push(config.clone());
        Ok(peer)
    }
}
