//! Mock collaborators for integration tests
//!
//! - `websocket_mock`: the realtime voice endpoint
//! - in-memory knowledge base: embedder, document store and classifier that
//!   record how they were called

#![allow(dead_code)]

pub mod websocket_mock;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use voice_relay::core::context::{
    Classification, Classifier, ContextResult, ContextRetriever, ConversationTurn, DocumentStore,
    Embedder, ScoredDocument, SearchFilters, StoreStats, StoredDocument,
};

pub use websocket_mock::MockRealtimeEndpoint;

/// Embedder returning a constant vector and counting calls.
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, _text: &str) -> ContextResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.1, 0.2, 0.3])
    }
}

/// Store holding a fixed set of scored documents.
pub struct StaticStore {
    pub documents: Vec<ScoredDocument>,
}

impl StaticStore {
    pub fn with_document(content: &str, similarity: f32) -> Self {
        Self {
            documents: vec![ScoredDocument {
                id: Some(json!(1)),
                content: content.to_string(),
                metadata: json!({"project_type": "ai_ml"}),
                similarity,
            }],
        }
    }
}

#[async_trait]
impl DocumentStore for StaticStore {
    async fn search(
        &self,
        _embedding: &[f32],
        _filters: &SearchFilters,
        limit: usize,
        _threshold: f32,
    ) -> ContextResult<Vec<ScoredDocument>> {
        Ok(self.documents.iter().take(limit).cloned().collect())
    }

    async fn insert(
        &self,
        content: &str,
        _embedding: Vec<f32>,
        metadata: Value,
    ) -> ContextResult<StoredDocument> {
        Ok(StoredDocument {
            id: Some(json!(99)),
            content: content.to_string(),
            metadata,
        })
    }

    async fn stats(&self) -> ContextResult<StoreStats> {
        Ok(StoreStats {
            total_documents: self.documents.len(),
            ..StoreStats::default()
        })
    }
}

/// Classifier recording the query and history it was given.
#[derive(Default)]
pub struct RecordingClassifier {
    pub seen: Mutex<Vec<(String, Vec<ConversationTurn>)>>,
}

#[async_trait]
impl Classifier for RecordingClassifier {
    async fn classify(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> ContextResult<Classification> {
        self.seen.lock().push((query.to_string(), history.to_vec()));
        Ok(Classification::default())
    }
}

/// A retriever over the in-memory fakes, plus handles to inspect them.
pub struct FakeKnowledge {
    pub retriever: Arc<ContextRetriever>,
    pub embedder: Arc<CountingEmbedder>,
    pub classifier: Arc<RecordingClassifier>,
}

impl FakeKnowledge {
    pub fn with_document(content: &str) -> Self {
        let embedder = Arc::new(CountingEmbedder::default());
        let classifier = Arc::new(RecordingClassifier::default());
        let store = Arc::new(StaticStore::with_document(content, 0.9));
        let retriever = Arc::new(ContextRetriever::new(
            embedder.clone(),
            store,
            classifier.clone(),
        ));
        Self {
            retriever,
            embedder,
            classifier,
        }
    }

    pub fn retrievals(&self) -> usize {
        self.embedder.calls.load(Ordering::SeqCst)
    }
}
