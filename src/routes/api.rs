use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, documents};
use crate::state::AppState;
use std::sync::Arc;

/// Create the REST router: health, configuration status and documents
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/api/check-config", get(api::check_config))
        .route("/api/documents", post(documents::create_document))
        .route("/api/documents/search", get(documents::search_documents))
        .route("/api/documents/stats", get(documents::document_stats))
        .layer(TraceLayer::new_for_http())
}
