//! Voice session relay
//!
//! Each client WebSocket becomes a [`Connection`] in the [`RelayHub`]. A
//! `start_session` frame opens an upstream bridge to the realtime endpoint;
//! allow-listed endpoint events come back wrapped as `openai_message`.
//!
//! # Protocol
//!
//! ## Client → Relay
//!
//! - **start_session**: `{config: {voice, instructions, ...}}`
//! - **audio_data**: `{audio: base64}`
//! - **commit_audio**: commit buffered audio and request a response
//! - **clear_audio**: clear the input audio buffer
//! - **interrupt**: cancel the current response
//! - **update_session**: `{session: partialConfig}`
//!
//! ## Relay → Client
//!
//! - **session_started**: `{session_id}`
//! - **session_ended**: `{reason?}`
//! - **error**: `{code?, message}`
//! - **openai_message**: `{data: endpointFrame}`
//!
//! After a `commit_audio`, the next completed transcription is used to pull
//! knowledge-base context and patch the session instructions, without
//! holding up the audio path.

mod handler;
mod hub;
pub mod messages;
pub mod session;

pub use handler::relay_handler;
pub use hub::{Connection, RelayHub};
pub use messages::{RelayIncomingMessage, RelayMessageRoute, RelayOutgoingMessage};
pub use session::{EnhancementPhase, HISTORY_LIMIT, RollingHistory, SessionState};
