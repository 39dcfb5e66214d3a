//! WebSocket client transport
//!
//! Connects a [`SignalingChannel`] to a relay server over WebSocket. The
//! socket is driven by a background task; frames sent before the connection
//! is up are queued and flushed once it opens.

use crate::signaling::{ChannelError, CloseInfo, RelayTransport, SignalingChannel, WeakSignalingChannel};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

enum Outbound {
    Frame(String),
    Close,
}

/// Relay transport backed by a WebSocket connection
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Start connecting to `url` and return the channel immediately.
    ///
    /// Connection progress is reported through the channel's `open`, `error`
    /// and `close` events. Must be called from within a tokio runtime.
    pub fn open(url: impl Into<String>) -> SignalingChannel {
        let (outbound, queue) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            outbound,
            closed: AtomicBool::new(false),
        });
        let channel = SignalingChannel::new(transport);
        tokio::spawn(run_connection(url.into(), channel.downgrade(), queue));
        channel
    }
}

impl RelayTransport for WebSocketTransport {
    fn send(&self, frame: String) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

async fn run_connection(
    url: String,
    channel: WeakSignalingChannel,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
) {
    info!("Connecting to signaling server: {}", url);

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", url, e);
            if let Some(channel) = channel.upgrade() {
                channel.notify_error(ChannelError::Transport(e.to_string()));
                channel.notify_close(CloseInfo::abnormal(e.to_string()));
            }
            return;
        }
    };

    match channel.upgrade() {
        Some(channel) => channel.notify_open(),
        None => return,
    }
    info!("Connected to signaling server: {}", url);

    let (mut write, mut read) = ws_stream.split();

    let close = loop {
        tokio::select! {
            command = queue.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = write.send(Message::Text(frame)).await {
                        error!("WebSocket send to {} failed: {}", url, e);
                        if let Some(channel) = channel.upgrade() {
                            channel.notify_error(ChannelError::Transport(e.to_string()));
                        }
                        break CloseInfo::abnormal(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break CloseInfo::normal();
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match channel.upgrade() {
                    Some(channel) => channel.receive_frame(&text),
                    None => break CloseInfo::normal(),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!("Signaling server {} closed the connection", url);
                    break frame
                        .map(|f| CloseInfo {
                            code: u16::from(f.code),
                            reason: f.reason.to_string(),
                        })
                        .unwrap_or_else(CloseInfo::normal);
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Ignoring {} byte binary frame from {}", data.len(), url);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error from {}: {}", url, e);
                    if let Some(channel) = channel.upgrade() {
                        channel.notify_error(ChannelError::Transport(e.to_string()));
                    }
                    break CloseInfo::abnormal(e.to_string());
                }
                None => break CloseInfo::abnormal("connection reset"),
            }
        }
    };

    info!("Signaling connection to {} closed ({})", url, close.code);
    if let Some(channel) = channel.upgrade() {
        channel.notify_close(close);
    }
}
