//! Supabase (PostgREST + pgvector) document store.
//!
//! Search goes through the `match_documents` RPC; inserts and stats use the
//! `documents` table directly.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use zeroize::Zeroize;

use super::{
    ContextError, ContextResult, DocumentStore, ScoredDocument, SearchFilters, StoreStats,
    StoredDocument,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MATCH_FUNCTION: &str = "match_documents";
const DOCUMENTS_TABLE: &str = "documents";

#[derive(Debug, Deserialize)]
struct DocumentRow {
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    created_at: Option<String>,
}

pub struct SupabaseStore {
    client: Client,
    url: String,
    anon_key: String,
}

impl Drop for SupabaseStore {
    fn drop(&mut self) {
        self.anon_key.zeroize();
    }
}

impl SupabaseStore {
    pub fn new(url: &str, anon_key: &str) -> ContextResult<Self> {
        if url.is_empty() || anon_key.is_empty() {
            return Err(ContextError::NotConfigured(
                "Vector store not configured (SUPABASE_URL / SUPABASE_ANON_KEY)".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ContextError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn send(&self, request: RequestBuilder) -> ContextResult<String> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ContextError::Http(format!("Request failed: {e}")))?;
        read_body(response).await
    }
}

async fn read_body(response: Response) -> ContextResult<String> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ContextError::Http(format!("Failed to read response: {e}")))?;

    if !status.is_success() {
        // PostgREST errors carry {"message", "code", "details", "hint"}
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        return Err(ContextError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(text)
}

/// PostgREST containment filter (`cs.{json}`) for the metadata column.
fn metadata_filter(filters: &SearchFilters) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    serde_json::to_string(filters).ok().map(|f| format!("cs.{f}"))
}

fn aggregate_stats(rows: Vec<DocumentRow>) -> StoreStats {
    let mut project_types: HashMap<String, usize> = HashMap::new();
    let mut service_types: HashSet<String> = HashSet::new();
    let mut latest: Option<String> = None;

    for row in &rows {
        if let Some(project) = row.metadata.get("project_type").and_then(Value::as_str) {
            *project_types.entry(project.to_string()).or_default() += 1;
        }
        if let Some(service) = row.metadata.get("service_type").and_then(Value::as_str) {
            service_types.insert(service.to_string());
        }
        // RFC 3339 timestamps from the same column sort lexicographically
        if let Some(created) = &row.created_at
            && latest.as_ref().is_none_or(|l| created > l)
        {
            latest = Some(created.clone());
        }
    }

    StoreStats {
        total_documents: rows.len(),
        unique_project_types: project_types.len(),
        unique_service_types: service_types.len(),
        latest_document: latest,
        project_types,
    }
}

#[async_trait]
impl DocumentStore for SupabaseStore {
    async fn search(
        &self,
        embedding: &[f32],
        filters: &SearchFilters,
        limit: usize,
        threshold: f32,
    ) -> ContextResult<Vec<ScoredDocument>> {
        let mut request = self
            .client
            .post(format!("{}/rest/v1/rpc/{MATCH_FUNCTION}", self.url))
            .json(&json!({
                "query_embedding": embedding,
                "match_threshold": threshold,
                "match_count": limit,
            }));
        if let Some(filter) = metadata_filter(filters) {
            request = request.query(&[("metadata", filter)]);
        }

        let text = self.send(request).await?;
        let mut documents: Vec<ScoredDocument> = serde_json::from_str(&text)
            .map_err(|e| ContextError::InvalidResponse(format!("{MATCH_FUNCTION}: {e}")))?;

        documents.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        documents.truncate(limit);
        debug!(count = documents.len(), "Vector search complete");
        Ok(documents)
    }

    async fn insert(
        &self,
        content: &str,
        embedding: Vec<f32>,
        metadata: Value,
    ) -> ContextResult<StoredDocument> {
        let request = self
            .client
            .post(format!("{}/rest/v1/{DOCUMENTS_TABLE}", self.url))
            .header("Prefer", "return=representation")
            .json(&json!({
                "content": content,
                "embedding": embedding,
                "metadata": metadata,
            }));

        let text = self.send(request).await?;
        let rows: Vec<StoredDocument> = serde_json::from_str(&text)
            .map_err(|e| ContextError::InvalidResponse(format!("insert: {e}")))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ContextError::InvalidResponse("insert returned no rows".to_string()))
    }

    async fn stats(&self) -> ContextResult<StoreStats> {
        let request = self
            .client
            .get(format!("{}/rest/v1/{DOCUMENTS_TABLE}", self.url))
            .query(&[("select", "metadata,created_at")]);

        let text = self.send(request).await?;
        let rows: Vec<DocumentRow> = serde_json::from_str(&text)
            .map_err(|e| ContextError::InvalidResponse(format!("stats: {e}")))?;
        Ok(aggregate_stats(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_requires_url_and_key() {
        assert!(matches!(
            SupabaseStore::new("", "anon"),
            Err(ContextError::NotConfigured(_))
        ));
        assert!(matches!(
            SupabaseStore::new("https://x.supabase.co", ""),
            Err(ContextError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_metadata_filter() {
        assert_eq!(metadata_filter(&SearchFilters::default()), None);
        let filters = SearchFilters {
            project_type: Some("ai_ml".into()),
            service_type: None,
        };
        assert_eq!(
            metadata_filter(&filters).as_deref(),
            Some(r#"cs.{"project_type":"ai_ml"}"#)
        );
    }

    #[tokio::test]
    async fn test_search_calls_match_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/match_documents"))
            .and(header("apikey", "anon"))
            .and(query_param("metadata", r#"cs.{"service_type":"design"}"#))
            .and(body_partial_json(json!({"match_count": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "content": "low", "metadata": {}, "similarity": 0.8},
                {"id": 2, "content": "high", "metadata": {"service_type": "design"}, "similarity": 0.9}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&server.uri(), "anon").unwrap();
        let filters = SearchFilters {
            project_type: None,
            service_type: Some("design".into()),
        };
        let documents = store.search(&[0.1, 0.2], &filters, 3, 0.75).await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].content, "high");
    }

    #[tokio::test]
    async fn test_insert_returns_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/documents"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                {"id": 42, "content": "hello", "metadata": {"source": "test"}}
            ])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&server.uri(), "anon").unwrap();
        let stored = store
            .insert("hello", vec![0.5], json!({"source": "test"}))
            .await
            .unwrap();
        assert_eq!(stored.id, Some(json!(42)));
        assert_eq!(stored.metadata["source"], "test");
    }

    #[tokio::test]
    async fn test_error_message_from_postgrest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/documents"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "relation \"public.documents\" does not exist", "code": "42P01"
            })))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&server.uri(), "anon").unwrap();
        match store.stats().await {
            Err(ContextError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("does not exist"));
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_stats() {
        let rows = vec![
            DocumentRow {
                metadata: json!({"project_type": "ai_ml", "service_type": "design"}),
                created_at: Some("2024-01-02T00:00:00Z".into()),
            },
            DocumentRow {
                metadata: json!({"project_type": "ai_ml", "service_type": "development"}),
                created_at: Some("2024-03-01T00:00:00Z".into()),
            },
            DocumentRow {
                metadata: json!({"project_type": "web_development"}),
                created_at: None,
            },
        ];

        let stats = aggregate_stats(rows);
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.unique_project_types, 2);
        assert_eq!(stats.unique_service_types, 2);
        assert_eq!(stats.project_types["ai_ml"], 2);
        assert_eq!(stats.latest_document.as_deref(), Some("2024-03-01T00:00:00Z"));
    }
}
