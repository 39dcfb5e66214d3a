//! Relay routing table
//!
//! A [`RelayHub`] maps connected peer ids to their outbound queues and
//! forwards `{to, data}` frames from one peer to another as `{from, data}`.
//! It never looks inside `data`.

use super::local::LocalTransport;
use crate::signaling::{ChannelError, OutgoingSignal, PeerId, SignalingChannel};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Result of routing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued for the target peer
    Delivered,
    /// No peer is connected under the target id
    UnknownPeer(PeerId),
    /// Not a valid outbound envelope
    Malformed,
}

struct Slot {
    connection_id: u64,
    sender: mpsc::UnboundedSender<String>,
}

/// Peers connected to a relay
pub struct RelayHub {
    peers: RwLock<HashMap<PeerId, Slot>>,
    next_connection_id: AtomicU64,
}

/// A peer's claim on its id; dropping it disconnects the peer
pub struct Registration {
    hub: Weak<RelayHub>,
    peer_id: PeerId,
    connection_id: u64,
}

impl Registration {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(&self.peer_id, self.connection_id);
        }
    }
}

impl RelayHub {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Claim `peer_id`. Frames relayed to it arrive on the returned receiver.
    pub fn register(
        self: &Arc<Self>,
        peer_id: &str,
    ) -> Result<(Registration, mpsc::UnboundedReceiver<String>), ChannelError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut peers = self.peers.write();
            if peers.contains_key(peer_id) {
                return Err(ChannelError::PeerIdTaken(peer_id.to_string()));
            }
            peers.insert(peer_id.to_string(), Slot { connection_id, sender });
        }
        info!("Peer {} connected to relay", peer_id);

        let registration = Registration {
            hub: Arc::downgrade(self),
            peer_id: peer_id.to_string(),
            connection_id,
        };
        Ok((registration, receiver))
    }

    fn unregister(&self, peer_id: &str, connection_id: u64) {
        let mut peers = self.peers.write();
        if peers
            .get(peer_id)
            .is_some_and(|slot| slot.connection_id == connection_id)
        {
            peers.remove(peer_id);
            info!("Peer {} disconnected from relay", peer_id);
        }
    }

    /// Forward one outbound frame sent by `from`
    pub fn route(&self, from: &str, frame: &str) -> RouteOutcome {
        let Some(signal) = OutgoingSignal::parse(frame) else {
            debug!("Dropping malformed frame from {}", from);
            return RouteOutcome::Malformed;
        };

        let (to, incoming) = signal.relay_from(from.to_string());
        let payload = match incoming.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Dropping frame from {}: {}", from, e);
                return RouteOutcome::Malformed;
            }
        };

        let peers = self.peers.read();
        match peers.get(&to) {
            Some(slot) if slot.sender.send(payload).is_ok() => RouteOutcome::Delivered,
            _ => {
                debug!("Dropping frame from {} to unknown peer {}", from, to);
                RouteOutcome::UnknownPeer(to)
            }
        }
    }

    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.peers.read().contains_key(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Connected peer ids, sorted
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.peers.read().keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Open an in-process channel connected to this hub as `peer_id`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect_local(self: &Arc<Self>, peer_id: &str) -> Result<SignalingChannel, ChannelError> {
        let (registration, frames) = self.register(peer_id)?;
        Ok(LocalTransport::connect(self.clone(), registration, frames))
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}
