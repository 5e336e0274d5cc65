//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and configuration status
//! - `documents` - Knowledge base document management
//! - `relay` - Voice session relay WebSocket

pub mod api;
pub mod documents;
pub mod relay;

pub use relay::relay_handler;
