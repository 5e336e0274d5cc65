//! OpenAI HTTP collaborators: embeddings and chat-completion classification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};
use zeroize::Zeroize;

use super::classifier::CLASSIFIER_HISTORY_TURNS;
use super::{Classification, Classifier, ContextError, ContextResult, ConversationTurn, Embedder};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CLASSIFIER_TEMPERATURE: f64 = 0.1;
const CLASSIFIER_MAX_TOKENS: u32 = 200;

const CLASSIFIER_PROMPT: &str = "You classify questions asked to a software agency's voice assistant. \
Reply with JSON only, using the keys projectType (one of web_development, mobile_development, ai_ml, \
backend_development, consulting or null), serviceType (one of development, design, consulting, \
maintenance, testing or null), topics (array of short strings) and intent (one of general_inquiry, \
pricing, timeline, engagement).";

/// OpenAI API error body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAIErrorResponse {
    pub error: OpenAIErrorDetail,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAIErrorDetail {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Shared connection details for both OpenAI collaborators.
struct OpenAIHttp {
    client: Client,
    api_base: String,
    api_key: String,
}

impl Drop for OpenAIHttp {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl OpenAIHttp {
    fn new(api_base: &str, api_key: &str) -> ContextResult<Self> {
        if api_key.is_empty() {
            return Err(ContextError::NotConfigured(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ContextError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> ContextResult<String> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(&self.api_key)
            .json(body)
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
        let message = match serde_json::from_str::<OpenAIErrorResponse>(&text) {
            Ok(parsed) => match parsed.error.error_type {
                Some(kind) => format!("{} ({kind})", parsed.error.message),
                None => parsed.error.message,
            },
            Err(_) => text,
        };
        return Err(ContextError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(text)
}

// =============================================================================
// Embeddings
// =============================================================================

/// Embedder backed by the OpenAI embeddings endpoint.
pub struct OpenAIEmbedder {
    http: OpenAIHttp,
    model: String,
}

impl OpenAIEmbedder {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> ContextResult<Self> {
        Ok(Self {
            http: OpenAIHttp::new(api_base, api_key)?,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> ContextResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(ContextError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let body = json!({
            "model": self.model,
            "input": text,
            "encoding_format": "float",
        });
        let text = self.http.post("/embeddings", &body).await?;

        let parsed: EmbeddingResponse = serde_json::from_str(&text)
            .map_err(|e| ContextError::InvalidResponse(format!("embeddings: {e}")))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ContextError::InvalidResponse("embeddings: empty data".to_string()))?;

        debug!(dimensions = embedding.len(), "Generated embedding");
        Ok(embedding)
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Classifier that asks a chat model for a JSON classification.
///
/// Replies that do not parse as a classification fall back to the default
/// classification instead of failing the retrieval.
pub struct OpenAIClassifier {
    http: OpenAIHttp,
    model: String,
}

impl OpenAIClassifier {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> ContextResult<Self> {
        Ok(Self {
            http: OpenAIHttp::new(api_base, api_key)?,
            model: model.to_string(),
        })
    }

    fn request_body(&self, query: &str, history: &[ConversationTurn]) -> Value {
        let skip = history.len().saturating_sub(CLASSIFIER_HISTORY_TURNS);
        let mut messages = vec![json!({"role": "system", "content": CLASSIFIER_PROMPT})];
        messages.extend(history.iter().skip(skip).map(|turn| json!(turn)));
        messages.push(json!({"role": "user", "content": query}));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": CLASSIFIER_TEMPERATURE,
            "max_tokens": CLASSIFIER_MAX_TOKENS,
        })
    }
}

fn parse_classification(content: &str) -> Classification {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<Classification>(trimmed) {
        Ok(classification) => classification,
        Err(e) => {
            warn!("Classifier reply was not valid JSON, using defaults: {}", e);
            Classification::default()
        }
    }
}

#[async_trait]
impl Classifier for OpenAIClassifier {
    async fn classify(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> ContextResult<Classification> {
        let body = self.request_body(query, history);
        let text = self.http.post("/chat/completions", &body).await?;

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| ContextError::InvalidResponse(format!("chat completion: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(parse_classification(&content))
    }
}
