//! Connection to a signaling server
//!
//! A [`SignalingChannel`] sends [`OutgoingSignal`]s through a pluggable
//! [`RelayTransport`] and turns inbound frames into `signal` events. The
//! transport owns the actual socket and reports back through the
//! `receive_frame` / `notify_*` entry points.

use super::envelope::{IncomingSignal, OutgoingSignal};
use super::event::EventSlot;
use super::port::SignalingPort;
use super::{ChannelError, PeerId};
use log::{debug, trace};
use std::sync::{Arc, Weak};

/// Outbound half of a relay connection
pub trait RelayTransport: Send + Sync {
    /// Send one serialized envelope
    fn send(&self, frame: String) -> Result<(), ChannelError>;

    /// Close the connection to the relay
    fn close(&self);
}

/// Close notification of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn normal() -> Self {
        Self { code: 1000, reason: String::new() }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self { code: 1006, reason: reason.into() }
    }
}

struct ChannelInner {
    transport: Arc<dyn RelayTransport>,
    open: EventSlot<()>,
    error: EventSlot<ChannelError>,
    signal: EventSlot<IncomingSignal>,
    close: EventSlot<CloseInfo>,
}

/// A connection to a signaling server
#[derive(Clone)]
pub struct SignalingChannel {
    inner: Arc<ChannelInner>,
}

/// Non-owning reference to a channel, held by transport tasks
#[derive(Clone)]
pub struct WeakSignalingChannel {
    inner: Weak<ChannelInner>,
}

impl WeakSignalingChannel {
    pub fn upgrade(&self) -> Option<SignalingChannel> {
        self.inner.upgrade().map(|inner| SignalingChannel { inner })
    }
}

impl SignalingChannel {
    /// Create a channel over a relay transport
    pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                transport,
                open: EventSlot::new(),
                error: EventSlot::new(),
                signal: EventSlot::new(),
                close: EventSlot::new(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakSignalingChannel {
        WeakSignalingChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Send relayed data to a peer on the network
    pub fn signal(&self, signal: OutgoingSignal) -> Result<(), ChannelError> {
        let frame = signal.to_json()?;
        trace!("Relaying {} bytes to {}", frame.len(), signal.to);
        self.inner.transport.send(frame)
    }

    /// Close the connection to the signaling server
    pub fn close(&self) {
        self.inner.transport.close();
    }

    /// Create a port communicating with a single peer on this channel
    pub fn port(&self, to: impl Into<PeerId>) -> SignalingPort {
        SignalingPort::new(to.into(), self.clone())
    }

    /// Fired when the connection to the relay is established
    pub fn on_open(&self) -> &EventSlot<()> {
        &self.inner.open
    }

    /// Fired when the relay transport reports an error
    pub fn on_error(&self) -> &EventSlot<ChannelError> {
        &self.inner.error
    }

    /// Fired for every valid inbound signal
    pub fn on_signal(&self) -> &EventSlot<IncomingSignal> {
        &self.inner.signal
    }

    /// Fired when the connection to the relay is closed
    pub fn on_close(&self) -> &EventSlot<CloseInfo> {
        &self.inner.close
    }

    /// Feed one inbound frame from the transport.
    ///
    /// Frames that do not parse as an inbound envelope are dropped.
    pub fn receive_frame(&self, frame: &str) {
        match IncomingSignal::parse(frame) {
            Some(signal) => self.dispatch_signal(signal),
            None => debug!("Dropping malformed relay frame ({} bytes)", frame.len()),
        }
    }

    /// Emit a `signal` event as if it had been received from the relay
    pub fn dispatch_signal(&self, signal: IncomingSignal) {
        self.inner.signal.dispatch(&signal);
    }

    pub fn notify_open(&self) {
        self.inner.open.dispatch(&());
    }

    pub fn notify_error(&self, error: ChannelError) {
        self.inner.error.dispatch(&error);
    }

    pub fn notify_close(&self, info: CloseInfo) {
        self.inner.close.dispatch(&info);
    }
}
