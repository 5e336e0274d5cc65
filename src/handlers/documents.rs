//! Knowledge base document endpoints
//!
//! Thin pass-throughs to the [`ContextRetriever`]'s embedder and store.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::core::context::{ContextRetriever, ScoredDocument, SearchFilters, StoreStats, StoredDocument};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 50;
const DEFAULT_SEARCH_THRESHOLD: f32 = 0.7;

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct CreateDocumentResponse {
    pub success: bool,
    pub document: StoredDocument,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredDocument>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: StoreStats,
}

fn retriever(state: &AppState) -> AppResult<&Arc<ContextRetriever>> {
    state.retriever.as_ref().ok_or_else(|| {
        AppError::NotConfigured(
            "Vector store not configured. Set SUPABASE_URL, SUPABASE_ANON_KEY and OPENAI_API_KEY."
                .to_string(),
        )
    })
}

/// `POST /api/documents`
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateDocumentRequest>,
) -> AppResult<(StatusCode, Json<CreateDocumentResponse>)> {
    if request.content.trim().is_empty() {
        return Err(AppError::BadRequest("Content is required".to_string()));
    }
    let retriever = retriever(&state)?;

    let metadata = Value::Object(request.metadata.unwrap_or_default());
    let document = retriever.add_document(&request.content, metadata).await?;
    info!(id = ?document.id, "Document added to knowledge base");

    Ok((
        StatusCode::CREATED,
        Json(CreateDocumentResponse {
            success: true,
            document,
        }),
    ))
}

/// `GET /api/documents/search`
pub async fn search_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResponse>> {
    let query = params
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Query parameter is required".to_string()))?;
    let retriever = retriever(&state)?;

    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let threshold = params.threshold.unwrap_or(DEFAULT_SEARCH_THRESHOLD);
    let filters = SearchFilters {
        project_type: params.project_type.filter(|p| !p.is_empty()),
        service_type: params.service_type.filter(|s| !s.is_empty()),
    };

    let results = retriever.search(&query, &filters, limit, threshold).await?;
    Ok(Json(SearchResponse {
        count: results.len(),
        results,
    }))
}

/// `GET /api/documents/stats`
pub async fn document_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<StatsResponse>> {
    let stats = retriever(&state)?.stats().await?;
    Ok(Json(StatsResponse { stats }))
}
