//! Knowledge-base retrieval for live sessions and the documents API.
//!
//! [`ContextRetriever`] classifies an utterance, embeds it and searches the
//! vector store. During a session every failure degrades to empty context;
//! the documents API gets the errors back.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    Classification, ContextError, ContextResult, ConversationTurn,
    KeywordClassifier, OpenAIClassifier, OpenAIEmbedder, RetrievedContext, ScoredDocument,
    SearchFilters, SharedClassifier, SharedEmbedder, SharedStore, Snippet, StoreStats,
    StoredDocument, SupabaseStore,
};
use crate::config::{ClassifierKind, ServerConfig};

/// Maximum number of snippets returned for one utterance.
pub const RESULT_CAP: usize = 3;

/// Minimum similarity for a snippet to be used during a live session.
pub const SIMILARITY_FLOOR: f32 = 0.75;

/// Produces ranked knowledge-base snippets for an utterance.
///
/// Live retrieval never fails: a classifier, embedder or store error is
/// logged and yields an empty context, so the session carries on with its
/// base instructions.
#[derive(Clone)]
pub struct ContextRetriever {
    embedder: SharedEmbedder,
    store: SharedStore,
    classifier: SharedClassifier,
}

impl std::fmt::Debug for ContextRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRetriever").finish_non_exhaustive()
    }
}

impl ContextRetriever {
    pub fn new(embedder: SharedEmbedder, store: SharedStore, classifier: SharedClassifier) -> Self {
        Self {
            embedder,
            store,
            classifier,
        }
    }

    /// Build the production collaborators from configuration.
    ///
    /// Returns `Ok(None)` when the vector store or the OpenAI key is missing.
    pub fn from_config(config: &ServerConfig) -> ContextResult<Option<Self>> {
        let (Some(url), Some(anon_key), Some(api_key)) = (
            config.supabase_url.as_deref(),
            config.supabase_anon_key.as_deref(),
            config.openai_api_key.as_deref(),
        ) else {
            return Ok(None);
        };

        let store: SharedStore = Arc::new(SupabaseStore::new(url, anon_key)?);
        let embedder: SharedEmbedder = Arc::new(OpenAIEmbedder::new(
            &config.openai_api_base,
            api_key,
            &config.embedding_model,
        )?);
        let classifier: SharedClassifier = match config.classifier {
            ClassifierKind::Keyword => Arc::new(KeywordClassifier::new()),
            ClassifierKind::OpenAI => Arc::new(OpenAIClassifier::new(
                &config.openai_api_base,
                api_key,
                &config.classifier_model,
            )?),
        };

        info!(
            classifier = config.classifier.as_str(),
            embedding_model = %config.embedding_model,
            "Knowledge base retrieval configured"
        );
        Ok(Some(Self::new(embedder, store, classifier)))
    }

    /// Context for the latest user utterance.
    ///
    /// At most [`RESULT_CAP`] snippets at or above [`SIMILARITY_FLOOR`], in
    /// descending relevance.
    pub async fn retrieve(&self, query: &str, history: &[ConversationTurn]) -> RetrievedContext {
        let classification = match self.classifier.classify(query, history).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!("Classification failed, searching without filters: {}", e);
                Classification::default()
            }
        };

        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Embedding failed, continuing without context: {}", e);
                return RetrievedContext {
                    snippets: Vec::new(),
                    classification,
                };
            }
        };

        let documents = match self
            .store
            .search(&embedding, &classification.filters(), RESULT_CAP, SIMILARITY_FLOOR)
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Knowledge base search failed, continuing without context: {}", e);
                return RetrievedContext {
                    snippets: Vec::new(),
                    classification,
                };
            }
        };

        let mut snippets: Vec<Snippet> = documents
            .into_iter()
            .filter(|d| d.similarity >= SIMILARITY_FLOOR)
            .map(Snippet::from_document)
            .collect();
        snippets.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        snippets.truncate(RESULT_CAP);

        debug!(
            snippets = snippets.len(),
            intent = %classification.intent,
            "Retrieved knowledge base context"
        );
        RetrievedContext {
            snippets,
            classification,
        }
    }

    /// Ad-hoc search used by the documents API. Errors are returned.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        threshold: f32,
    ) -> ContextResult<Vec<ScoredDocument>> {
        if query.trim().is_empty() {
            return Err(ContextError::InvalidInput("query is required".to_string()));
        }
        let embedding = self.embedder.embed(query).await?;
        self.store.search(&embedding, filters, limit, threshold).await
    }

    /// Embed and store one document.
    pub async fn add_document(&self, content: &str, metadata: Value) -> ContextResult<StoredDocument> {
        if content.trim().is_empty() {
            return Err(ContextError::InvalidInput("content is required".to_string()));
        }
        let embedding = self.embedder.embed(content).await?;
        self.store.insert(content, embedding, metadata).await
    }

    pub async fn stats(&self) -> ContextResult<StoreStats> {
        self.store.stats().await
    }
}
