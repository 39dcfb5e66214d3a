//! Relay envelope framing
//!
//! One JSON object per frame:
//! - outbound (peer to relay): `{"to": "<peer>", "data": <any>}`
//! - inbound (relay to peer): `{"from": "<peer>", "data": <any>}`
//!
//! `data` is opaque at this layer.

use super::{ChannelError, PeerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A signal relayed from a signaling server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingSignal {
    /// The peer sending this signal
    pub from: PeerId,
    /// Any JSON value
    pub data: Value,
}

/// A signal relayed to a signaling server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingSignal {
    /// The peer this signal will be relayed to
    pub to: PeerId,
    /// Any JSON value
    pub data: Value,
}

#[derive(Deserialize)]
struct RawIncoming {
    #[serde(default)]
    from: Option<PeerId>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct RawOutgoing {
    #[serde(default)]
    to: Option<PeerId>,
    #[serde(default)]
    data: Option<Value>,
}

impl IncomingSignal {
    /// Parse an inbound frame.
    ///
    /// Returns `None` for anything that is not a JSON object with a non-empty
    /// `from` and a truthy `data`.
    pub fn parse(frame: &str) -> Option<Self> {
        let raw: RawIncoming = serde_json::from_str(frame).ok()?;
        let from = raw.from.filter(|f| !f.is_empty())?;
        let data = raw.data.filter(is_truthy)?;
        Some(Self { from, data })
    }

    pub fn to_json(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Serialization(e.to_string()))
    }
}

impl OutgoingSignal {
    pub fn new(to: impl Into<PeerId>, data: Value) -> Self {
        Self { to: to.into(), data }
    }

    /// Parse an outbound frame as received by a relay server
    pub fn parse(frame: &str) -> Option<Self> {
        let raw: RawOutgoing = serde_json::from_str(frame).ok()?;
        let to = raw.to.filter(|t| !t.is_empty())?;
        let data = raw.data.filter(is_truthy)?;
        Some(Self { to, data })
    }

    pub fn to_json(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Serialization(e.to_string()))
    }

    /// Rewrite into the frame the relay delivers to the recipient
    pub fn relay_from(self, from: impl Into<PeerId>) -> (PeerId, IncomingSignal) {
        let incoming = IncomingSignal {
            from: from.into(),
            data: self.data,
        };
        (self.to, incoming)
    }
}

/// JSON truthiness of an envelope payload
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
