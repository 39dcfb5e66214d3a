//! Per-peer view over a signaling channel

use super::channel::SignalingChannel;
use super::envelope::OutgoingSignal;
use super::event::{EventSlot, ListenerId};
use super::{ChannelError, PeerId};
use serde_json::Value;
use std::sync::{Arc, Weak};

/// A message received from the peer a port is bound to
#[derive(Debug, Clone, PartialEq)]
pub struct PortMessage {
    pub data: Value,
}

struct PortInner {
    to: PeerId,
    channel: SignalingChannel,
    message: EventSlot<PortMessage>,
    signal_listener: ListenerId,
}

impl Drop for PortInner {
    fn drop(&mut self) {
        self.channel.on_signal().remove_listener(self.signal_listener);
    }
}

/// A connection to a single peer on a signaling network.
///
/// Outbound messages are addressed to `to`; the `message` event carries the
/// channel's signals whose sender is `to`. Any number of ports may be bound
/// to the same peer and all of them see the same messages. The port stays
/// subscribed to its channel until its last handle is dropped.
#[derive(Clone)]
pub struct SignalingPort {
    inner: Arc<PortInner>,
}

impl SignalingPort {
    pub(crate) fn new(to: PeerId, channel: SignalingChannel) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<PortInner>| {
            let weak = weak.clone();
            let peer = to.clone();
            let signal_listener = channel.on_signal().add_listener(move |signal| {
                if signal.from != peer {
                    return;
                }
                if let Some(port) = weak.upgrade() {
                    port.message.dispatch(&PortMessage {
                        data: signal.data.clone(),
                    });
                }
            });

            PortInner {
                to,
                channel,
                message: EventSlot::new(),
                signal_listener,
            }
        });

        Self { inner }
    }

    /// The peer this port is communicating with
    pub fn to(&self) -> &str {
        &self.inner.to
    }

    pub fn channel(&self) -> &SignalingChannel {
        &self.inner.channel
    }

    /// Send any JSON value to the peer
    pub fn send(&self, data: Value) -> Result<(), ChannelError> {
        self.inner
            .channel
            .signal(OutgoingSignal::new(self.inner.to.clone(), data))
    }

    /// Fired whenever a message has been received from the peer
    pub fn on_message(&self) -> &EventSlot<PortMessage> {
        &self.inner.message
    }
}
