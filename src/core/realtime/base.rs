//! Base types for the realtime conversational endpoint.
//!
//! The endpoint is a persistent WebSocket peer that accepts JSON control
//! frames and emits JSON events. Audio is PCM 16-bit signed little-endian,
//! mono, 24kHz, carried as opaque base64 strings.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the realtime endpoint.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the endpoint failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Endpoint Settings
// =============================================================================

/// Where and how to reach the realtime endpoint.
#[derive(Clone)]
pub struct EndpointSettings {
    /// Base WebSocket URL (without the model query parameter)
    pub url: String,
    /// Model selector appended as `?model=`
    pub model: String,
    /// Bearer token
    pub api_key: String,
    /// Upper bound for the WebSocket handshake
    pub connect_timeout: Duration,
}

impl EndpointSettings {
    /// Full connection URL including the model parameter.
    pub fn connection_url(&self) -> RealtimeResult<Url> {
        Url::parse_with_params(&self.url, &[("model", self.model.as_str())])
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("{}: {e}", self.url)))
    }
}

impl fmt::Debug for EndpointSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointSettings")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Drop for EndpointSettings {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}
