//! Knowledge-base context for live sessions.
//!
//! A [`ContextRetriever`] turns a user utterance plus recent history into a
//! small ranked set of snippets, and an [`InstructionComposer`] folds them
//! into the session instructions. The embedding, search and classification
//! collaborators sit behind traits so the relay can run against OpenAI and
//! Supabase in production and against in-memory fakes in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod classifier;
mod composer;
mod metadata;
mod openai;
mod retriever;
mod supabase;

pub use classifier::KeywordClassifier;
pub use composer::{DEFAULT_INSTRUCTION_BUDGET, InstructionComposer};
pub use metadata::extract_metadata;
pub use openai::{OpenAIClassifier, OpenAIEmbedder};
pub use retriever::{ContextRetriever, RESULT_CAP, SIMILARITY_FLOOR};
pub use supabase::SupabaseStore;

// =============================================================================
// Error Types
// =============================================================================

/// Errors from the context collaborators.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotConfigured(String),
}

pub type ContextResult<T> = Result<T, ContextError>;

// =============================================================================
// Conversation History
// =============================================================================

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One `{role, text}` entry of the rolling history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    #[serde(rename = "content")]
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Coarse topic/category guess used to narrow the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_intent")]
    pub intent: String,
}

fn default_intent() -> String {
    "general_inquiry".to_string()
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            project_type: None,
            service_type: None,
            topics: Vec::new(),
            intent: default_intent(),
        }
    }
}

impl Classification {
    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            project_type: self.project_type.clone(),
            service_type: self.service_type.clone(),
        }
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Metadata containment filters for a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.project_type.is_none() && self.service_type.is_none()
    }
}

/// A document returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    #[serde(default)]
    pub id: Option<Value>,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub similarity: f32,
}

/// A stored document as returned by an insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(default)]
    pub id: Option<Value>,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Aggregate numbers about the document store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub unique_project_types: usize,
    pub unique_service_types: usize,
    pub latest_document: Option<String>,
    #[serde(default)]
    pub project_types: HashMap<String, usize>,
}

// =============================================================================
// Retrieved Context
// =============================================================================

/// One ranked piece of knowledge-base text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snippet {
    pub text: String,
    /// Similarity in 0.0..=1.0
    pub relevance: f32,
    /// Category tags taken from document metadata, e.g. `Project Type: ai_ml`
    pub tags: Vec<String>,
}

impl Snippet {
    pub fn from_document(doc: ScoredDocument) -> Self {
        let mut tags = Vec::new();
        if let Some(project) = doc.metadata.get("project_type").and_then(Value::as_str) {
            tags.push(format!("Project Type: {project}"));
        }
        if let Some(service) = doc.metadata.get("service_type").and_then(Value::as_str) {
            tags.push(format!("Service Type: {service}"));
        }
        Self {
            text: doc.content,
            relevance: doc.similarity,
            tags,
        }
    }
}

/// Result of one retrieval, consumed once by the composer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub snippets: Vec<Snippet>,
    pub classification: Classification,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> ContextResult<Vec<f32>>;
}

/// Similarity search backend holding the knowledge base.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn search(
        &self,
        embedding: &[f32],
        filters: &SearchFilters,
        limit: usize,
        threshold: f32,
    ) -> ContextResult<Vec<ScoredDocument>>;

    async fn insert(
        &self,
        content: &str,
        embedding: Vec<f32>,
        metadata: Value,
    ) -> ContextResult<StoredDocument>;

    async fn stats(&self) -> ContextResult<StoreStats>;
}

/// Lightweight classification pass over the query and recent history.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> ContextResult<Classification>;
}

pub type SharedEmbedder = Arc<dyn Embedder>;
pub type SharedStore = Arc<dyn DocumentStore>;
pub type SharedClassifier = Arc<dyn Classifier>;
