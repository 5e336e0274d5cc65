//! Realtime conversational endpoint support.
//!
//! The relay speaks the OpenAI Realtime protocol upstream. `base` holds the
//! protocol-independent error and settings types.

pub mod base;
pub mod openai;

pub use base::{EndpointSettings, RealtimeError, RealtimeResult};
pub use openai::{
    BridgeEvent, BridgeHandle, ClientEvent, MaxTokens, OpenAIRealtimeVoice, SessionConfig,
    TurnDetection, UpstreamBridge,
};
