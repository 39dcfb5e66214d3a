//! Session description and ICE types exchanged over signaling
//!
//! Field names follow the browser `RTCSessionDescriptionInit` /
//! `RTCIceCandidateInit` JSON so payloads interoperate with web peers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        }
    }
}

/// A session description (`{"type": "offer", "sdp": "v=0..."}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Answer, sdp: sdp.into() }
    }
}

/// A trickled ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IceCandidate {
    #[serde(default)]
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            ..Default::default()
        }
    }

    /// An empty candidate string also marks the end of candidates
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.is_empty()
    }
}

/// ICE connectivity state of the underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IceConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, IceConnectionState::Connected | IceConnectionState::Completed)
    }

    /// States after which a connection no longer owns its peer's traffic
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IceConnectionState::Disconnected | IceConnectionState::Failed | IceConnectionState::Closed
        )
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Negotiation progress of a signaling connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Accepted inbound connection waiting for the replayed offer
    AwaitingOffer,
    /// Creating the local offer
    Initiating,
    /// Local offer sent, waiting for an answer
    OfferSent,
    /// Remote offer applied, answer in progress
    OfferReceived,
    /// Local answer sent
    AnswerSent,
    /// Remote answer applied
    AnswerReceived,
    /// ICE connected
    Connected,
    /// ICE disconnected, failed or closed
    Disconnected,
}

/// Media kind of a remote track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A media track the remote peer started sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

/// A data channel opened by the remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDataChannel {
    pub label: String,
    pub id: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn description_uses_browser_field_names() {
        let value = serde_json::to_value(SessionDescription::offer("v=0")).unwrap();
        assert_eq!(value, json!({"type": "offer", "sdp": "v=0"}));
    }

    #[test]
    fn candidate_uses_browser_field_names() {
        let candidate: IceCandidate = serde_json::from_value(json!({
            "candidate": "candidate:0 1 UDP 2122252543 10.0.0.2 5000 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0,
            "usernameFragment": "abcd"
        }))
        .unwrap();
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
        assert_eq!(candidate.username_fragment.as_deref(), Some("abcd"));
        assert!(!candidate.is_end_of_candidates());
    }

    #[test]
    fn terminal_ice_states() {
        assert!(IceConnectionState::Disconnected.is_terminal());
        assert!(IceConnectionState::Failed.is_terminal());
        assert!(IceConnectionState::Closed.is_terminal());
        assert!(!IceConnectionState::Checking.is_terminal());
        assert!(IceConnectionState::Completed.is_connected());
    }
}
