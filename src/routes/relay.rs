//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade into a relay connection
///
/// # Example
///
/// ```json
/// // Client opens a session
/// {"type": "start_session", "config": {"voice": "alloy"}}
///
/// // Relay responds
/// {"type": "session_started", "session_id": "..."}
///
/// // Client streams audio
/// {"type": "audio_data", "audio": "<base64 pcm16>"}
/// {"type": "commit_audio"}
///
/// // Relay forwards endpoint events
/// {"type": "openai_message", "data": {"type": "response.audio.delta", ...}}
/// ```
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
