//! Signaling-driven peer connection
//!
//! A [`SignalingPeerConnection`] binds one [`RtcPeer`] to one
//! [`SignalingPort`] and runs the offer/answer/candidate exchange over it.
//!
//! Remote messages and locally gathered candidates are queued to a single
//! driver task per connection, so each negotiation step completes before the
//! next one starts. Connections never share state with each other.

use super::backend::RtcPeer;
use super::signaling::SignalingMessage;
use super::types::{IceCandidate, IceConnectionState, NegotiationState, RemoteDataChannel, RemoteTrack};
use super::WebRTCError;
use crate::signaling::{EventSlot, ListenerId, PeerId, SignalingPort};
use log::{debug, info, trace, warn};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// How a connection came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// Created locally; sends an offer right away
    Outbound,
    /// Created by accepting a remote offer; purely reactive
    Inbound,
}

enum Command {
    Remote(SignalingMessage),
    LocalCandidate(Option<IceCandidate>),
}

struct ConnectionShared {
    to: PeerId,
    port: SignalingPort,
    peer: Arc<dyn RtcPeer>,
    state: RwLock<NegotiationState>,
    ice_state: RwLock<IceConnectionState>,
    ice_events: EventSlot<IceConnectionState>,
    remote_tracks: RwLock<Vec<RemoteTrack>>,
    track_events: EventSlot<RemoteTrack>,
    remote_data_channels: RwLock<Vec<RemoteDataChannel>>,
    data_channel_events: EventSlot<RemoteDataChannel>,
}

/// A peer connection using a [`SignalingPort`] to exchange session
/// descriptions and candidates.
///
/// Dropping the last handle stops the negotiation and closes the underlying
/// peer connection.
pub struct SignalingPeerConnection {
    shared: Arc<ConnectionShared>,
    entry: Entry,
    message_listener: ListenerId,
    // Keeps the driver queue open; only weak senders live elsewhere.
    _commands: mpsc::UnboundedSender<Command>,
}

impl SignalingPeerConnection {
    /// Create a connection that immediately offers to the port's peer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initiate(port: SignalingPort, peer: Arc<dyn RtcPeer>) -> Arc<Self> {
        Self::start(port, peer, Entry::Outbound)
    }

    /// Create a connection that waits for the peer's offer
    pub fn respond(port: SignalingPort, peer: Arc<dyn RtcPeer>) -> Arc<Self> {
        Self::start(port, peer, Entry::Inbound)
    }

    fn start(port: SignalingPort, peer: Arc<dyn RtcPeer>, entry: Entry) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let initial = match entry {
            Entry::Outbound => NegotiationState::Initiating,
            Entry::Inbound => NegotiationState::AwaitingOffer,
        };

        let shared = Arc::new(ConnectionShared {
            to: port.to().to_string(),
            port,
            peer,
            state: RwLock::new(initial),
            ice_state: RwLock::new(IceConnectionState::New),
            ice_events: EventSlot::new(),
            remote_tracks: RwLock::new(Vec::new()),
            track_events: EventSlot::new(),
            remote_data_channels: RwLock::new(Vec::new()),
            data_channel_events: EventSlot::new(),
        });

        let remote_tx = tx.downgrade();
        let peer_id = shared.to.clone();
        let message_listener = shared.port.on_message().add_listener(move |message| {
            let Some(parsed) = SignalingMessage::from_value(&message.data) else {
                debug!("Dropping malformed signaling payload from {}", peer_id);
                return;
            };
            if let Some(tx) = remote_tx.upgrade() {
                let _ = tx.send(Command::Remote(parsed));
            }
        });

        let candidate_tx = tx.downgrade();
        shared.peer.on_ice_candidate(Box::new(move |candidate| {
            if let Some(tx) = candidate_tx.upgrade() {
                let _ = tx.send(Command::LocalCandidate(candidate));
            }
        }));

        let weak: Weak<ConnectionShared> = Arc::downgrade(&shared);
        shared.peer.on_ice_connection_state_change(Box::new(move |state| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_ice_state(state);
            }
        }));

        let weak = Arc::downgrade(&shared);
        shared.peer.on_track(Box::new(move |track| {
            if let Some(shared) = weak.upgrade() {
                info!("Connection {} received {:?} track {}", shared.to, track.kind, track.id);
                shared.remote_tracks.write().push(track.clone());
                shared.track_events.dispatch(&track);
            }
        }));

        let weak = Arc::downgrade(&shared);
        shared.peer.on_data_channel(Box::new(move |channel| {
            if let Some(shared) = weak.upgrade() {
                info!("Connection {} received data channel {}", shared.to, channel.label);
                shared.remote_data_channels.write().push(channel.clone());
                shared.data_channel_events.dispatch(&channel);
            }
        }));

        tokio::spawn(drive(shared.clone(), entry, rx));

        Arc::new(Self {
            shared,
            entry,
            message_listener,
            _commands: tx,
        })
    }

    /// The peer this connection negotiates with
    pub fn to(&self) -> &str {
        &self.shared.to
    }

    pub fn entry(&self) -> Entry {
        self.entry
    }

    pub fn port(&self) -> &SignalingPort {
        &self.shared.port
    }

    /// The underlying peer connection
    pub fn peer(&self) -> &Arc<dyn RtcPeer> {
        &self.shared.peer
    }

    pub fn state(&self) -> NegotiationState {
        *self.shared.state.read()
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        *self.shared.ice_state.read()
    }

    /// Fired on every ICE connection state change
    pub fn on_ice_connection_state_change(&self) -> &EventSlot<IceConnectionState> {
        &self.shared.ice_events
    }

    /// The underlying peer connection as its concrete type
    pub fn peer_as<P: RtcPeer + 'static>(&self) -> Option<&P> {
        self.shared.peer.as_any().downcast_ref::<P>()
    }

    /// Tracks the remote peer has added so far
    pub fn remote_tracks(&self) -> Vec<RemoteTrack> {
        self.shared.remote_tracks.read().clone()
    }

    /// Fired for every track the remote peer adds
    pub fn on_track(&self) -> &EventSlot<RemoteTrack> {
        &self.shared.track_events
    }

    /// Data channels the remote peer has opened so far
    pub fn remote_data_channels(&self) -> Vec<RemoteDataChannel> {
        self.shared.remote_data_channels.read().clone()
    }

    /// Fired for every data channel the remote peer opens
    pub fn on_data_channel(&self) -> &EventSlot<RemoteDataChannel> {
        &self.shared.data_channel_events
    }

    /// Close the underlying peer connection
    pub async fn close(&self) -> Result<(), WebRTCError> {
        self.shared.peer.close().await
    }
}

impl Drop for SignalingPeerConnection {
    fn drop(&mut self) {
        self.shared.port.on_message().remove_listener(self.message_listener);
    }
}

impl ConnectionShared {
    fn set_state(&self, state: NegotiationState) {
        let mut current = self.state.write();
        if *current != state {
            debug!("Connection {} negotiation: {:?} -> {:?}", self.to, *current, state);
            *current = state;
        }
    }

    fn handle_ice_state(&self, state: IceConnectionState) {
        *self.ice_state.write() = state;
        info!("Connection {} ICE state: {}", self.to, state);

        if state.is_connected() {
            self.set_state(NegotiationState::Connected);
        } else if state.is_terminal() {
            self.set_state(NegotiationState::Disconnected);
        }

        self.ice_events.dispatch(&state);
    }

    fn send(&self, message: &SignalingMessage) -> Result<(), WebRTCError> {
        trace!("Sending {} to {}", message.kind(), self.to);
        self.port.send(message.to_value()?)?;
        Ok(())
    }

    async fn send_offer(&self) -> Result<(), WebRTCError> {
        let offer = self.peer.create_offer().await?;
        self.peer.set_local_description(offer.clone()).await?;
        self.send(&SignalingMessage::Offer(offer))?;
        self.set_state(NegotiationState::OfferSent);
        Ok(())
    }

    async fn handle_remote(&self, message: SignalingMessage) -> Result<(), WebRTCError> {
        match message {
            SignalingMessage::Offer(offer) => {
                // Any offer wins, including one racing our own.
                self.peer.set_remote_description(offer).await?;
                self.set_state(NegotiationState::OfferReceived);

                let answer = self.peer.create_answer().await?;
                self.peer.set_local_description(answer.clone()).await?;
                self.send(&SignalingMessage::Answer(answer))?;
                self.set_state(NegotiationState::AnswerSent);
            }
            SignalingMessage::Answer(answer) => {
                self.peer.set_remote_description(answer).await?;
                self.set_state(NegotiationState::AnswerReceived);
            }
            SignalingMessage::Candidate(candidate) => {
                self.peer.add_ice_candidate(candidate).await?;
            }
        }
        Ok(())
    }
}

async fn drive(
    shared: Arc<ConnectionShared>,
    entry: Entry,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    if entry == Entry::Outbound {
        if let Err(e) = shared.send_offer().await {
            warn!("Failed to offer to {}: {}", shared.to, e);
        }
    }

    while let Some(command) = commands.recv().await {
        let result = match command {
            Command::Remote(message) => {
                let kind = message.kind();
                shared
                    .handle_remote(message)
                    .await
                    .map_err(|e| (kind, e))
            }
            Command::LocalCandidate(candidate) => shared
                .send(&SignalingMessage::Candidate(candidate))
                .map_err(|e| ("local candidate", e)),
        };

        if let Err((kind, e)) = result {
            warn!("Connection {}: {} failed: {}", shared.to, kind, e);
        }
    }

    debug!("Negotiation with {} finished, closing peer connection", shared.to);
    if let Err(e) = shared.peer.close().await {
        debug!("Closing peer connection to {} failed: {}", shared.to, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::SignalingChannel;
    use crate::testing::{wait_until, MockPeer, PeerCall, RecordingTransport};
    use crate::webrtc::types::{SessionDescription, TrackKind};
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (Arc<RecordingTransport>, SignalingChannel, Arc<MockPeer>) {
        let transport = Arc::new(RecordingTransport::new());
        let channel = SignalingChannel::new(transport.clone());
        (transport, channel, Arc::new(MockPeer::new()))
    }

    fn frame_from(peer: &str, data: serde_json::Value) -> String {
        json!({"from": peer, "data": data}).to_string()
    }

    #[tokio::test]
    async fn outbound_sends_single_offer_before_candidates() {
        let (transport, channel, peer) = setup();
        let conn = SignalingPeerConnection::initiate(channel.port("bob"), peer.clone());
        // Gathered before the driver ran: must still go out after the offer.
        peer.emit_candidate(Some(IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 9 typ host")));

        assert!(wait_until(|| transport.envelopes().len() == 2).await);
        let sent = transport.data_to("bob");
        assert_eq!(sent[0]["type"], "offer");
        assert_eq!(sent[0]["body"]["sdp"], "mock-offer");
        assert_eq!(sent[1]["type"], "candidate");
        assert_eq!(sent.iter().filter(|m| m["type"] == "offer").count(), 1);

        assert_eq!(
            peer.calls()[..2],
            [
                PeerCall::CreateOffer,
                PeerCall::SetLocal(SessionDescription::offer("mock-offer"))
            ]
        );
        assert_eq!(conn.state(), NegotiationState::OfferSent);
        assert_eq!(conn.entry(), Entry::Outbound);
    }

    #[tokio::test]
    async fn answer_sets_remote_and_sends_nothing() {
        let (transport, channel, peer) = setup();
        let conn = SignalingPeerConnection::initiate(channel.port("bob"), peer.clone());
        assert!(wait_until(|| conn.state() == NegotiationState::OfferSent).await);

        channel.receive_frame(&frame_from(
            "bob",
            json!({"type": "answer", "body": {"type": "answer", "sdp": "remote-answer"}}),
        ));

        assert!(wait_until(|| conn.state() == NegotiationState::AnswerReceived).await);
        assert!(peer
            .calls()
            .contains(&PeerCall::SetRemote(SessionDescription::answer("remote-answer"))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.envelopes().len(), 1);
    }

    #[tokio::test]
    async fn inbound_answers_offer_without_offering() {
        let (transport, channel, peer) = setup();
        let conn = SignalingPeerConnection::respond(channel.port("alice"), peer.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(transport.envelopes().is_empty());
        assert_eq!(conn.state(), NegotiationState::AwaitingOffer);

        channel.receive_frame(&frame_from(
            "alice",
            json!({"type": "offer", "body": {"type": "offer", "sdp": "remote-offer"}}),
        ));

        assert!(wait_until(|| conn.state() == NegotiationState::AnswerSent).await);
        assert_eq!(
            peer.calls(),
            vec![
                PeerCall::SetRemote(SessionDescription::offer("remote-offer")),
                PeerCall::CreateAnswer,
                PeerCall::SetLocal(SessionDescription::answer("mock-answer")),
            ]
        );
        assert_eq!(
            transport.data_to("alice"),
            vec![json!({"type": "answer", "body": {"type": "answer", "sdp": "mock-answer"}})]
        );
    }

    #[tokio::test]
    async fn racing_offer_is_answered_by_outbound_connection() {
        let (transport, channel, peer) = setup();
        let conn = SignalingPeerConnection::initiate(channel.port("bob"), peer.clone());
        channel.receive_frame(&frame_from(
            "bob",
            json!({"type": "offer", "body": {"type": "offer", "sdp": "their-offer"}}),
        ));

        assert!(wait_until(|| conn.state() == NegotiationState::AnswerSent).await);
        let kinds: Vec<_> = transport
            .data_to("bob")
            .iter()
            .map(|m| m["type"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(kinds, vec!["offer", "answer"]);
    }

    #[tokio::test]
    async fn null_candidate_is_tolerated() {
        let (_, channel, peer) = setup();
        let conn = SignalingPeerConnection::respond(channel.port("alice"), peer.clone());

        channel.receive_frame(&frame_from("alice", json!({"type": "candidate", "body": null})));
        channel.receive_frame(&frame_from(
            "alice",
            json!({"type": "candidate", "body": {"candidate": "", "sdpMid": "0"}}),
        ));
        channel.receive_frame(&frame_from(
            "alice",
            json!({"type": "offer", "body": {"type": "offer", "sdp": "o"}}),
        ));

        assert!(wait_until(|| conn.state() == NegotiationState::AnswerSent).await);
        let calls = peer.calls();
        assert_eq!(calls[0], PeerCall::AddCandidate(None));
        assert!(matches!(&calls[1], PeerCall::AddCandidate(Some(c)) if c.is_end_of_candidates()));
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped() {
        let (transport, channel, peer) = setup();
        let conn = SignalingPeerConnection::respond(channel.port("alice"), peer.clone());

        channel.receive_frame(&frame_from("alice", json!({"type": "hangup"})));
        channel.receive_frame(&frame_from("alice", json!("{not json")));
        channel.receive_frame(&frame_from("alice", json!({"type": "offer", "body": [1]})));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(peer.calls().is_empty());
        assert!(transport.envelopes().is_empty());
        assert_eq!(conn.state(), NegotiationState::AwaitingOffer);
    }

    #[tokio::test]
    async fn failed_step_does_not_stop_negotiation() {
        let (_, channel, peer) = setup();
        let _conn = SignalingPeerConnection::respond(channel.port("alice"), peer.clone());
        peer.fail_set_remote(true);

        channel.receive_frame(&frame_from(
            "alice",
            json!({"type": "offer", "body": {"type": "offer", "sdp": "bad"}}),
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
        peer.fail_set_remote(false);
        channel.receive_frame(&frame_from(
            "alice",
            json!({"type": "candidate", "body": {"candidate": "candidate:2"}}),
        ));

        assert!(wait_until(|| peer
            .calls()
            .iter()
            .any(|c| matches!(c, PeerCall::AddCandidate(Some(_)))))
        .await);
        assert!(!peer.calls().contains(&PeerCall::CreateAnswer));
    }

    #[tokio::test]
    async fn ice_state_changes_are_tracked_and_dispatched() {
        let (_, channel, peer) = setup();
        let conn = SignalingPeerConnection::respond(channel.port("alice"), peer.clone());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = seen.clone();
        conn.on_ice_connection_state_change()
            .add_listener(move |state| s.lock().push(*state));

        peer.set_ice_state(IceConnectionState::Connected);
        assert_eq!(conn.state(), NegotiationState::Connected);
        peer.set_ice_state(IceConnectionState::Disconnected);
        assert_eq!(conn.state(), NegotiationState::Disconnected);
        assert_eq!(conn.ice_connection_state(), IceConnectionState::Disconnected);
        assert_eq!(
            *seen.lock(),
            vec![IceConnectionState::Connected, IceConnectionState::Disconnected]
        );
    }

    #[tokio::test]
    async fn remote_tracks_and_channels_are_recorded_and_dispatched() {
        let (_, channel, peer) = setup();
        let conn = SignalingPeerConnection::respond(channel.port("alice"), peer.clone());
        let labels = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let l = labels.clone();
        conn.on_data_channel()
            .add_listener(move |channel| l.lock().push(channel.label.clone()));

        let track = RemoteTrack {
            id: "audio0".to_string(),
            stream_id: "stream".to_string(),
            kind: TrackKind::Audio,
        };
        peer.emit_track(track.clone());
        peer.emit_data_channel(RemoteDataChannel { label: "chat".to_string(), id: 1 });

        assert_eq!(conn.remote_tracks(), vec![track]);
        assert_eq!(conn.remote_data_channels()[0].label, "chat");
        assert_eq!(*labels.lock(), vec!["chat".to_string()]);
        assert!(conn.peer_as::<MockPeer>().is_some());
    }

    #[tokio::test]
    async fn dropping_connection_closes_peer() {
        let (_, channel, peer) = setup();
        let port = channel.port("alice");
        let conn = SignalingPeerConnection::respond(port.clone(), peer.clone());
        assert_eq!(port.on_message().listener_count(), 1);

        drop(conn);
        assert_eq!(port.on_message().listener_count(), 0);
        assert!(wait_until(|| peer.calls().contains(&PeerCall::Close)).await);
    }
}
