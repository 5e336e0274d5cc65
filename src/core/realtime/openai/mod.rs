//! OpenAI Realtime API integration.
//!
//! - `config`: voices, audio formats and initialization defaults
//! - `messages`: client events, the server event allow-list and tracked events
//! - `bridge`: the per-session WebSocket connection

mod bridge;
mod config;
mod messages;

pub use bridge::{BridgeEvent, BridgeHandle, UpstreamBridge, describe_close_code};
pub use config::{
    AUDIO_FORMAT, DEFAULT_PREFIX_PADDING_MS, DEFAULT_SILENCE_DURATION_MS, DEFAULT_TEMPERATURE,
    DEFAULT_VAD_THRESHOLD, OpenAIRealtimeVoice, TRANSCRIPTION_MODEL,
};
pub use messages::{
    ClientEvent, ContentPart, ConversationItem, FORWARDED_EVENT_TYPES, InputAudioTranscription,
    MaxTokens, RESPONSE_DONE, Response, SessionConfig, TRANSCRIPTION_COMPLETED,
    TrackedServerEvent, TurnDetection, event_type, is_forwarded,
};
