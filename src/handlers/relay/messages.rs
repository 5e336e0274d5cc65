//! Relay WebSocket message types
//!
//! Client frames are decoded into a closed set of variants at the boundary;
//! anything that does not match is logged and dropped by the handler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::realtime::{MaxTokens, OpenAIRealtimeVoice, SessionConfig, TurnDetection};
use crate::core::realtime::openai::{
    DEFAULT_PREFIX_PADDING_MS, DEFAULT_SILENCE_DURATION_MS, DEFAULT_VAD_THRESHOLD,
};

/// Maximum allowed size for instructions (100 KB)
pub const MAX_INSTRUCTIONS_SIZE: usize = 100 * 1024;

// =============================================================================
// Incoming Messages (Client -> Relay)
// =============================================================================

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayIncomingMessage {
    /// Open an upstream session
    StartSession {
        #[serde(default)]
        config: ClientSessionConfig,
    },

    /// Append base64 audio to the upstream input buffer
    AudioData { audio: String },

    /// Commit buffered audio and request a response
    CommitAudio,

    ClearAudio,

    /// Cancel the current response
    Interrupt,

    /// Partial session update, forwarded to the endpoint as given
    UpdateSession { session: Map<String, Value> },
}

/// Session options a client may pass to `start_session`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientSessionConfig {
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub turn_detection: Option<ClientTurnDetection>,
    #[serde(default)]
    pub modalities: Option<Vec<String>>,
    #[serde(default)]
    pub max_response_output_tokens: Option<MaxTokens>,
}

/// Turn detection as sent by clients: thresholds only, server VAD unless
/// `type` is `"none"`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientTurnDetection {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub prefix_padding_ms: Option<u32>,
    #[serde(default)]
    pub silence_duration_ms: Option<u32>,
}

impl From<ClientTurnDetection> for TurnDetection {
    fn from(config: ClientTurnDetection) -> Self {
        if config.kind.as_deref() == Some("none") {
            return TurnDetection::None {};
        }
        TurnDetection::ServerVad {
            threshold: Some(config.threshold.unwrap_or(DEFAULT_VAD_THRESHOLD)),
            prefix_padding_ms: Some(config.prefix_padding_ms.unwrap_or(DEFAULT_PREFIX_PADDING_MS)),
            silence_duration_ms: Some(
                config
                    .silence_duration_ms
                    .unwrap_or(DEFAULT_SILENCE_DURATION_MS),
            ),
        }
    }
}

impl ClientSessionConfig {
    /// Full initialization config, falling back to `base_instructions`.
    pub fn into_initial(self, base_instructions: &str) -> SessionConfig {
        let voice = self
            .voice
            .as_deref()
            .map(OpenAIRealtimeVoice::from_str_or_default)
            .unwrap_or_default();
        let instructions = self
            .instructions
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| base_instructions.to_string());

        SessionConfig::initial(
            voice,
            instructions,
            self.turn_detection.map(TurnDetection::from),
            self.modalities,
            self.temperature,
            self.max_response_output_tokens,
        )
    }
}

/// Validation errors for incoming messages
#[derive(Debug, Clone, PartialEq)]
pub enum RelayValidationError {
    InstructionsTooLarge { size: usize, max: usize },
}

impl std::fmt::Display for RelayValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InstructionsTooLarge { size, max } => {
                write!(
                    f,
                    "Instructions too large: {} bytes (max: {} bytes)",
                    size, max
                )
            }
        }
    }
}

impl std::error::Error for RelayValidationError {}

fn check_instructions(instructions: Option<&str>) -> Result<(), RelayValidationError> {
    if let Some(instructions) = instructions {
        let size = instructions.len();
        if size > MAX_INSTRUCTIONS_SIZE {
            return Err(RelayValidationError::InstructionsTooLarge {
                size,
                max: MAX_INSTRUCTIONS_SIZE,
            });
        }
    }
    Ok(())
}

/// The `instructions` string of an `update_session` payload, if any.
pub fn update_instructions(session: &Map<String, Value>) -> Option<&str> {
    session.get("instructions").and_then(Value::as_str)
}

impl RelayIncomingMessage {
    /// Validates user-provided instruction sizes.
    pub fn validate_size(&self) -> Result<(), RelayValidationError> {
        match self {
            RelayIncomingMessage::StartSession { config } => {
                check_instructions(config.instructions.as_deref())
            }
            RelayIncomingMessage::UpdateSession { session } => {
                check_instructions(update_instructions(session))
            }
            RelayIncomingMessage::AudioData { .. }
            | RelayIncomingMessage::CommitAudio
            | RelayIncomingMessage::ClearAudio
            | RelayIncomingMessage::Interrupt => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayIncomingMessage::StartSession { .. } => "start_session",
            RelayIncomingMessage::AudioData { .. } => "audio_data",
            RelayIncomingMessage::CommitAudio => "commit_audio",
            RelayIncomingMessage::ClearAudio => "clear_audio",
            RelayIncomingMessage::Interrupt => "interrupt",
            RelayIncomingMessage::UpdateSession { .. } => "update_session",
        }
    }
}

// =============================================================================
// Outgoing Messages (Relay -> Client)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayOutgoingMessage {
    SessionStarted { session_id: String },

    SessionEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },

    /// An allow-listed endpoint frame, verbatim
    OpenaiMessage { data: Value },
}

impl RelayOutgoingMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        RelayOutgoingMessage::Error {
            code: Some(code.to_string()),
            message: message.into(),
        }
    }
}

/// Routes for the per-connection sender task
#[derive(Debug)]
pub enum RelayMessageRoute {
    Outgoing(RelayOutgoingMessage),
}
