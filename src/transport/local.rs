//! In-process relay transport
//!
//! Connects a [`SignalingChannel`] directly to a [`RelayHub`] without a
//! socket in between.

use super::hub::{RelayHub, Registration};
use crate::signaling::{
    ChannelError, CloseInfo, PeerId, RelayTransport, SignalingChannel, WeakSignalingChannel,
};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct LocalTransport {
    hub: Arc<RelayHub>,
    peer_id: PeerId,
    registration: Mutex<Option<Registration>>,
}

impl LocalTransport {
    pub(crate) fn connect(
        hub: Arc<RelayHub>,
        registration: Registration,
        frames: mpsc::UnboundedReceiver<String>,
    ) -> SignalingChannel {
        let transport = Arc::new(Self {
            hub,
            peer_id: registration.peer_id().to_string(),
            registration: Mutex::new(Some(registration)),
        });
        let channel = SignalingChannel::new(transport);
        tokio::spawn(pump(channel.downgrade(), frames));
        channel
    }
}

impl RelayTransport for LocalTransport {
    fn send(&self, frame: String) -> Result<(), ChannelError> {
        if self.registration.lock().is_none() {
            return Err(ChannelError::Closed);
        }
        self.hub.route(&self.peer_id, &frame);
        Ok(())
    }

    fn close(&self) {
        let registration = self.registration.lock().take();
        if registration.is_some() {
            debug!("Closing local relay connection for {}", self.peer_id);
        }
    }
}

async fn pump(channel: WeakSignalingChannel, mut frames: mpsc::UnboundedReceiver<String>) {
    match channel.upgrade() {
        Some(channel) => channel.notify_open(),
        None => return,
    }

    while let Some(frame) = frames.recv().await {
        let Some(channel) = channel.upgrade() else {
            return;
        };
        channel.receive_frame(&frame);
    }

    if let Some(channel) = channel.upgrade() {
        channel.notify_close(CloseInfo::normal());
    }
}
