//! WebRTC Signaling Protocol
//!
//! Offer/answer exchange and ICE candidate trickling carried as the `data`
//! of relay envelopes:
//! `{"type": "offer"|"answer"|"candidate", "body": <description | candidate | null>}`

use super::types::{IceCandidate, SessionDescription};
use super::WebRTCError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Signaling message types for WebRTC negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// SDP offer
    Offer(SessionDescription),

    /// SDP answer
    Answer(SessionDescription),

    /// ICE candidate, `None` once gathering is complete
    Candidate(Option<IceCandidate>),
}

impl SignalingMessage {
    /// Parse a message from a port payload.
    ///
    /// Accepts the message object itself or a JSON string holding it.
    /// Returns `None` for anything else; callers drop those payloads.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => serde_json::from_str(text).ok(),
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    /// The `type` field of a payload, without validating its body.
    ///
    /// Accepts the same object or JSON string forms as [`Self::from_value`].
    pub fn message_type(value: &Value) -> Option<String> {
        let parsed;
        let object = match value {
            Value::String(text) => {
                parsed = serde_json::from_str::<Value>(text).ok()?;
                &parsed
            }
            _ => value,
        };
        object.get("type")?.as_str().map(str::to_string)
    }

    /// Parse a signaling message from JSON
    pub fn from_json(json: &str) -> Result<Self, WebRTCError> {
        serde_json::from_str(json)
            .map_err(|e| WebRTCError::SdpError(format!("Invalid signaling message: {}", e)))
    }

    /// Serialize to a port payload
    pub fn to_value(&self) -> Result<Value, WebRTCError> {
        serde_json::to_value(self)
            .map_err(|e| WebRTCError::SdpError(format!("Failed to serialize message: {}", e)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer(_) => "offer",
            SignalingMessage::Answer(_) => "answer",
            SignalingMessage::Candidate(_) => "candidate",
        }
    }

    pub fn is_offer(&self) -> bool {
        matches!(self, SignalingMessage::Offer(_))
    }
}
