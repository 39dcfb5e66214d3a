//! Relay signaling server
//!
//! Peers connect over WebSocket to `{path}/{peer_id}` and exchange
//! `{to, data}` frames. The server forwards each one to `to` as
//! `{from, data}` without interpreting `data`.

use super::hub::{RelayHub, Registration};
use crate::config::ServerConfig;
use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Build the relay router
pub fn router(hub: Arc<RelayHub>, path: &str) -> Router {
    let endpoint = format!("{}/{{peer_id}}", path.trim_end_matches('/'));
    Router::new()
        .route("/health", get(health_handler))
        .route(&endpoint, get(relay_handler))
        .with_state(hub)
}

/// Run the relay server until it fails
pub async fn run_relay_server(
    config: &ServerConfig,
    hub: Arc<RelayHub>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "Relay server listening on ws://{}{}/{{peer_id}}",
        addr,
        config.path.trim_end_matches('/')
    );

    axum::serve(listener, router(hub, &config.path))
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    Ok(())
}

async fn health_handler(State(hub): State<Arc<RelayHub>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "peers": hub.peer_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn relay_handler(
    Path(peer_id): Path<String>,
    State(hub): State<Arc<RelayHub>>,
    ws: WebSocketUpgrade,
) -> Response {
    let (registration, frames) = match hub.register(&peer_id) {
        Ok(registered) => registered,
        Err(e) => {
            warn!("Rejecting relay connection: {}", e);
            return (StatusCode::CONFLICT, e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_relay_connection(socket, hub, registration, frames))
}

/// Pump one peer's socket until either side closes
pub async fn handle_relay_connection(
    socket: WebSocket,
    hub: Arc<RelayHub>,
    registration: Registration,
    mut frames: mpsc::UnboundedReceiver<String>,
) {
    let peer_id = registration.peer_id().to_string();
    info!("Relay connection established for {}", peer_id);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward frames relayed to this peer
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                hub.route(&peer_id, text.as_str());
            }
            Ok(Message::Binary(data)) => {
                debug!("Ignoring {} byte binary frame from {}", data.len(), peer_id);
            }
            Ok(Message::Close(_)) => {
                debug!("Peer {} closed relay connection", peer_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", peer_id, e);
                break;
            }
            _ => {}
        }
    }

    // Releases the peer id
    drop(registration);
    send_task.abort();

    info!("Relay connection handler finished for {}", peer_id);
}
