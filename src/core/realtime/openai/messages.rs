//! OpenAI Realtime API WebSocket message types.
//!
//! Client events are typed and serialized by the relay. Server events are
//! kept as raw JSON so allow-listed frames reach the client verbatim; only
//! the two events the relay does bookkeeping on are decoded.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Update session configuration (partial merge)
//! - input_audio_buffer.append - Append audio to buffer
//! - input_audio_buffer.commit - Commit audio buffer
//! - input_audio_buffer.clear - Clear audio buffer
//! - response.create - Generate a response
//! - response.cancel - Cancel current response

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::{
    AUDIO_FORMAT, DEFAULT_PREFIX_PADDING_MS, DEFAULT_SILENCE_DURATION_MS, DEFAULT_TEMPERATURE,
    DEFAULT_VAD_THRESHOLD, OpenAIRealtimeVoice, TRANSCRIPTION_MODEL,
};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration for OpenAI Realtime API.
///
/// Every field is optional so the same type doubles as a partial patch:
/// a `session.update` carrying this struct only names the keys that are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    /// Temperature for response generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum response output tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<MaxTokens>,
}

impl SessionConfig {
    /// Full configuration sent in the initialization frame.
    ///
    /// Audio formats and the transcription model are fixed; everything else
    /// falls back to relay defaults when not provided.
    pub fn initial(
        voice: OpenAIRealtimeVoice,
        instructions: String,
        turn_detection: Option<TurnDetection>,
        modalities: Option<Vec<String>>,
        temperature: Option<f32>,
        max_response_output_tokens: Option<MaxTokens>,
    ) -> Self {
        let format = AUDIO_FORMAT.to_string();
        Self {
            modalities: Some(
                modalities.unwrap_or_else(|| vec!["text".to_string(), "audio".to_string()]),
            ),
            instructions: Some(instructions),
            voice: Some(voice.as_str().to_string()),
            input_audio_format: Some(format.clone()),
            output_audio_format: Some(format),
            input_audio_transcription: Some(InputAudioTranscription {
                model: TRANSCRIPTION_MODEL.to_string(),
            }),
            turn_detection: Some(turn_detection.unwrap_or_default()),
            temperature: Some(temperature.unwrap_or(DEFAULT_TEMPERATURE)),
            max_response_output_tokens: Some(max_response_output_tokens.unwrap_or_default()),
        }
    }

    /// Patch that replaces only the instructions.
    pub fn instructions_patch(instructions: String) -> Self {
        Self {
            instructions: Some(instructions),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Maximum tokens configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxTokens {
    /// Specific number of tokens
    Number(u32),
    /// Infinite tokens ("inf")
    Infinite(String),
}

impl Default for MaxTokens {
    fn default() -> Self {
        MaxTokens::Infinite("inf".to_string())
    }
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

/// Turn detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
    /// No turn detection, the client commits audio explicitly
    #[serde(rename = "none")]
    None {},
}

impl Default for TurnDetection {
    fn default() -> Self {
        TurnDetection::ServerVad {
            threshold: Some(DEFAULT_VAD_THRESHOLD),
            prefix_padding_ms: Some(DEFAULT_PREFIX_PADDING_MS),
            silence_duration_ms: Some(DEFAULT_SILENCE_DURATION_MS),
        }
    }
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the OpenAI Realtime API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Client-supplied session update, forwarded key for key
    #[serde(rename = "session.update")]
    SessionMerge { session: Map<String, Value> },

    /// Append audio to input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    /// Event type string as it appears on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } | ClientEvent::SessionMerge { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit => "input_audio_buffer.commit",
            ClientEvent::InputAudioBufferClear => "input_audio_buffer.clear",
            ClientEvent::ResponseCreate => "response.create",
            ClientEvent::ResponseCancel => "response.cancel",
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server event types relayed to clients. Anything else is dropped.
pub const FORWARDED_EVENT_TYPES: &[&str] = &[
    "session.created",
    "session.updated",
    "conversation.item.created",
    "conversation.item.truncated",
    "conversation.item.deleted",
    "conversation.item.input_audio_transcription.completed",
    "conversation.item.input_audio_transcription.failed",
    "response.created",
    "response.done",
    "response.output_item.added",
    "response.output_item.done",
    "response.content_part.added",
    "response.content_part.done",
    "response.text.delta",
    "response.text.done",
    "response.audio_transcript.delta",
    "response.audio_transcript.done",
    "response.audio.delta",
    "response.audio.done",
    "response.function_call_arguments.delta",
    "response.function_call_arguments.done",
    "rate_limits.updated",
    "input_audio_buffer.committed",
    "input_audio_buffer.cleared",
    "input_audio_buffer.speech_started",
    "input_audio_buffer.speech_stopped",
    "error",
];

pub const TRANSCRIPTION_COMPLETED: &str = "conversation.item.input_audio_transcription.completed";
pub const RESPONSE_DONE: &str = "response.done";

/// Whether a server event type is relayed to clients.
pub fn is_forwarded(event_type: &str) -> bool {
    FORWARDED_EVENT_TYPES.contains(&event_type)
}

/// The `type` tag of a raw server frame.
pub fn event_type(frame: &Value) -> Option<&str> {
    frame.get("type").and_then(Value::as_str)
}

/// Server events the relay decodes for its own bookkeeping.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum TrackedServerEvent {
    /// Input audio transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        item_id: Option<String>,
        transcript: String,
    },

    /// Response done, carrying the assistant's finished output
    #[serde(rename = "response.done")]
    ResponseDone { response: Response },
}

/// Response information.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<ConversationItem>,
}

impl Response {
    /// Concatenated assistant text, preferring text parts then audio transcripts.
    pub fn assistant_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.role.as_deref() == Some("assistant"))
            .flat_map(|item| item.content.iter())
            .filter_map(|part| part.text.as_deref().or(part.transcript.as_deref()))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Conversation item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: Option<String>,
    /// Item role (user, assistant, system)
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentPart {
    /// Content type (input_text, input_audio, text, audio)
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Transcript of audio content
    #[serde(default)]
    pub transcript: Option<String>,
}
