//! Connection factory
//!
//! Owns a [`SignalingChannel`], keeps one [`SignalingPeerConnection`] per
//! remote peer and turns unsolicited offers into [`OfferEvent`]s instead of
//! connecting automatically.

use super::backend::PeerConnector;
use super::session::SignalingPeerConnection;
use super::signaling::SignalingMessage;
use super::types::SessionDescription;
use super::WebRTCError;
use crate::config::RtcConfig;
use crate::signaling::{EventSlot, IncomingSignal, ListenerId, PeerId, SignalingChannel};
use log::{debug, info, trace, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

struct FactoryInner {
    channel: SignalingChannel,
    connector: Arc<dyn PeerConnector>,
    configuration: RwLock<RtcConfig>,
    connections: RwLock<HashMap<PeerId, Arc<SignalingPeerConnection>>>,
    offer: EventSlot<OfferEvent>,
    signal_listener: ListenerId,
}

impl Drop for FactoryInner {
    fn drop(&mut self) {
        self.channel.on_signal().remove_listener(self.signal_listener);
    }
}

/// Creates and configures [`SignalingPeerConnection`]s, and surfaces offers
/// from peers nobody is connected to yet.
#[derive(Clone)]
pub struct ConnectionFactory {
    inner: Arc<FactoryInner>,
}

impl ConnectionFactory {
    pub fn new(
        channel: SignalingChannel,
        connector: Arc<dyn PeerConnector>,
        configuration: RtcConfig,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<FactoryInner>| {
            let weak = weak.clone();
            let signal_listener = channel.on_signal().add_listener(move |signal| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_signal(signal);
                }
            });

            FactoryInner {
                channel,
                connector,
                configuration: RwLock::new(configuration),
                connections: RwLock::new(HashMap::new()),
                offer: EventSlot::new(),
                signal_listener,
            }
        });

        Self { inner }
    }

    /// Factory creating webrtc-rs peer connections
    #[cfg(feature = "webrtc-backend")]
    pub fn with_webrtc(channel: SignalingChannel, configuration: RtcConfig) -> Self {
        Self::new(channel, Arc::new(super::WebRtcConnector::new()), configuration)
    }

    /// Create a connection to `to` and start offering immediately.
    ///
    /// The connection is registered under `to`, replacing any existing entry.
    pub async fn create_connection(
        &self,
        to: impl Into<PeerId>,
    ) -> Result<Arc<SignalingPeerConnection>, WebRTCError> {
        let to = to.into();
        let configuration = self.get_configuration();
        let peer = self.inner.connector.connect(&configuration).await?;

        let connection = SignalingPeerConnection::initiate(self.inner.channel.port(to.clone()), peer);
        self.inner.register(&connection, true)?;
        info!("Created connection to {}", to);
        Ok(connection)
    }

    /// Fired whenever an offer arrives from a peer without a connection
    pub fn on_offer(&self) -> &EventSlot<OfferEvent> {
        &self.inner.offer
    }

    pub fn channel(&self) -> &SignalingChannel {
        &self.inner.channel
    }

    pub fn get_configuration(&self) -> RtcConfig {
        self.inner.configuration.read().clone()
    }

    /// Configuration for connections created from now on
    pub fn set_configuration(&self, configuration: RtcConfig) {
        *self.inner.configuration.write() = configuration;
    }

    pub fn connection(&self, peer: &str) -> Option<Arc<SignalingPeerConnection>> {
        self.inner.connections.read().get(peer).cloned()
    }

    pub fn is_registered(&self, peer: &str) -> bool {
        self.inner.connections.read().contains_key(peer)
    }

    /// Registered peer ids, sorted
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.inner.connections.read().keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.read().len()
    }
}

impl FactoryInner {
    fn handle_signal(self: &Arc<Self>, signal: &IncomingSignal) {
        // A registered connection owns all traffic from its peer.
        if self.connections.read().contains_key(&signal.from) {
            return;
        }

        // Only the type decides; the accepted connection validates the body.
        if SignalingMessage::message_type(&signal.data).as_deref() != Some("offer") {
            trace!("Ignoring non-offer signal from unknown peer {}", signal.from);
            return;
        }
        let offer = match SignalingMessage::from_value(&signal.data) {
            Some(SignalingMessage::Offer(offer)) => Some(offer),
            _ => {
                warn!("Offer from {} has a malformed description", signal.from);
                None
            }
        };

        info!("Offer from {} awaiting acceptance", signal.from);
        let event = OfferEvent {
            from: signal.from.clone(),
            data: signal.data.clone(),
            offer,
            acceptance: Arc::new(Acceptance {
                factory: Arc::downgrade(self),
                accepted: AtomicBool::new(false),
            }),
        };
        self.offer.dispatch(&event);
    }

    fn register(
        self: &Arc<Self>,
        connection: &Arc<SignalingPeerConnection>,
        replace: bool,
    ) -> Result<(), WebRTCError> {
        let peer = connection.to().to_string();
        let previous = {
            let mut connections = self.connections.write();
            if !replace && connections.contains_key(&peer) {
                return Err(WebRTCError::AlreadyConnected(peer));
            }
            connections.insert(peer.clone(), connection.clone())
        };
        if previous.is_some() {
            warn!("Replaced registered connection to {}", peer);
        }

        let factory = Arc::downgrade(self);
        let registered = Arc::downgrade(connection);
        connection.on_ice_connection_state_change().add_listener(move |state| {
            if !state.is_terminal() {
                return;
            }
            if let Some(factory) = factory.upgrade() {
                factory.unregister(&peer, &registered);
            }
        });
        Ok(())
    }

    /// Remove `peer` if it is still registered to `connection`
    fn unregister(&self, peer: &str, connection: &Weak<SignalingPeerConnection>) {
        let removed = {
            let mut connections = self.connections.write();
            let is_current = connections
                .get(peer)
                .map(|current| Weak::ptr_eq(&Arc::downgrade(current), connection))
                .unwrap_or(false);
            if is_current {
                connections.remove(peer)
            } else {
                None
            }
        };
        if removed.is_some() {
            info!("Connection to {} ended, unregistered", peer);
        }
    }

    async fn accept(
        self: &Arc<Self>,
        from: PeerId,
        data: Value,
    ) -> Result<Arc<SignalingPeerConnection>, WebRTCError> {
        if self.connections.read().contains_key(&from) {
            return Err(WebRTCError::AlreadyConnected(from));
        }

        let configuration = self.configuration.read().clone();
        let peer = self.connector.connect(&configuration).await?;
        let connection = SignalingPeerConnection::respond(self.channel.port(from.clone()), peer);
        self.register(&connection, false)?;

        // Replay the accepted offer so the new connection answers it.
        debug!("Replaying offer from {}", from);
        self.channel.dispatch_signal(IncomingSignal { from, data });
        Ok(connection)
    }
}

struct Acceptance {
    factory: Weak<FactoryInner>,
    accepted: AtomicBool,
}

/// An offer received from a peer that has no connection yet
#[derive(Clone)]
pub struct OfferEvent {
    from: PeerId,
    data: Value,
    offer: Option<SessionDescription>,
    acceptance: Arc<Acceptance>,
}

impl OfferEvent {
    /// The peer sending this offer
    pub fn from(&self) -> &str {
        &self.from
    }

    /// The raw signal payload
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The offered description, `None` if the body did not parse
    pub fn offer(&self) -> Option<&SessionDescription> {
        self.offer.as_ref()
    }

    pub fn is_accepted(&self) -> bool {
        self.acceptance.accepted.load(Ordering::SeqCst)
    }

    /// Connect to the offering peer and answer this offer.
    ///
    /// Succeeds once per event; a failed attempt leaves it acceptable.
    /// Fails with `AlreadyConnected` if a connection to the peer was
    /// registered in the meantime; it is never replaced.
    pub async fn accept(&self) -> Result<Arc<SignalingPeerConnection>, WebRTCError> {
        if self.acceptance.accepted.swap(true, Ordering::SeqCst) {
            return Err(WebRTCError::AlreadyAccepted(self.from.clone()));
        }
        let result = match self.acceptance.factory.upgrade() {
            Some(factory) => factory.accept(self.from.clone(), self.data.clone()).await,
            None => Err(WebRTCError::FactoryClosed),
        };
        if let Err(e) = &result {
            debug!("Accepting offer from {} failed: {}", self.from, e);
            self.acceptance.accepted.store(false, Ordering::SeqCst);
        }
        result
    }
}

impl std::fmt::Debug for OfferEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfferEvent")
            .field("from", &self.from)
            .field("accepted", &self.is_accepted())
            .finish()
    }
}
