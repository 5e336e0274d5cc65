//! Relay WebSocket handler

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

use super::hub::Connection;
use super::messages::{RelayIncomingMessage, RelayMessageRoute, RelayOutgoingMessage};

/// Optimized channel buffer size for audio workloads
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Relay WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket and registers it with the
/// [`RelayHub`](super::RelayHub) for the lifetime of the socket.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    info!(peer = %addr, "Relay WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state))
}

/// Handle the relay WebSocket connection
async fn handle_relay_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<RelayMessageRoute>(CHANNEL_BUFFER_SIZE);

    let connection = app_state.hub.register(message_tx.clone());
    let connection_id = connection.id();

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let RelayMessageRoute::Outgoing(message) = route;
            let json_str = match serde_json::to_string(&message) {
                Ok(json_str) => json_str,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            };

            if let Err(e) = sender.send(Message::Text(json_str.into())).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    loop {
        select! {
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_relay_message(msg, &connection, &app_state).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, "Relay WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(connection_id = %connection_id, "Relay WebSocket connection closed by client");
                        break;
                    }
                }
            }
            // A failed send to the client ends the connection
            _ = &mut sender_task => {
                warn!(connection_id = %connection_id, "Client transport send failed, closing connection");
                break;
            }
        }
    }

    // Cleanup
    app_state.hub.remove(connection_id);
    sender_task.abort();

    info!(connection_id = %connection_id, "Relay WebSocket connection terminated");
}

/// Process one incoming WebSocket message. Returns false to end the loop.
async fn process_relay_message(
    msg: Message,
    connection: &Arc<Connection>,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        Message::Text(text) => {
            debug!(connection_id = %connection.id(), "Received text message: {} bytes", text.len());

            let incoming: RelayIncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(connection_id = %connection.id(), "Dropping malformed client frame: {}", e);
                    return true;
                }
            };

            if let Err(e) = incoming.validate_size() {
                warn!(connection_id = %connection.id(), "Message validation failed: {}", e);
                connection
                    .send(RelayOutgoingMessage::error("validation_error", e.to_string()))
                    .await;
                return true;
            }

            app_state.hub.dispatch(connection, incoming).await;
            true
        }
        Message::Binary(data) => {
            warn!(connection_id = %connection.id(), "Dropping binary frame: {} bytes", data.len());
            true
        }
        Message::Ping(_) => {
            debug!("Received ping");
            true
        }
        Message::Pong(_) => {
            debug!("Received pong");
            true
        }
        Message::Close(_) => {
            info!(connection_id = %connection.id(), "Relay WebSocket close received");
            false
        }
    }
}
