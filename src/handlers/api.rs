use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check handler
pub async fn health_check() -> &'static str {
    "OK"
}

/// Feature flags reported to the front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigStatus {
    pub openai_configured: bool,
    pub vector_store_configured: bool,
    pub context_enhancement: bool,
    pub realtime_model: String,
}

/// Report which collaborators are configured, without exposing secrets.
pub async fn check_config(State(state): State<Arc<AppState>>) -> Json<ConfigStatus> {
    let config = &state.config;
    Json(ConfigStatus {
        openai_configured: config.has_openai(),
        vector_store_configured: config.has_vector_store(),
        context_enhancement: state.hub.enhancement_enabled(),
        realtime_model: config.realtime_model.clone(),
    })
}
