//! OpenAI Realtime API configuration types.
//!
//! Voice selection, the fixed audio format and the default turn-detection
//! parameters used by the initialization frame.

use serde::{Deserialize, Serialize};

/// Audio encoding negotiated for both directions: PCM 16-bit, 24kHz, mono,
/// little-endian.
pub const AUDIO_FORMAT: &str = "pcm16";

/// Input transcription model selector.
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Server VAD activation threshold.
pub const DEFAULT_VAD_THRESHOLD: f32 = 0.5;

/// Audio kept before detected speech, in ms.
pub const DEFAULT_PREFIX_PADDING_MS: u32 = 300;

/// Silence that ends a user turn, in ms.
pub const DEFAULT_SILENCE_DURATION_MS: u32 = 200;

/// Sampling temperature for responses.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

// =============================================================================
// Voices
// =============================================================================

/// Available voices for OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    /// Alloy voice (default)
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIRealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ash" => Self::Ash,
            "ballad" => Self::Ballad,
            "coral" => Self::Coral,
            "echo" => Self::Echo,
            "sage" => Self::Sage,
            "shimmer" => Self::Shimmer,
            "verse" => Self::Verse,
            _ => Self::Alloy,
        }
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
