use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::context::ContextRetriever;
use crate::handlers::relay::RelayHub;

/// Application state shared by all handlers
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    pub hub: RelayHub,
    /// Knowledge base access, `None` when the vector store or OpenAI key is missing
    pub retriever: Option<Arc<ContextRetriever>>,
}

impl AppState {
    /// Build state from configuration, wiring the production collaborators.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let retriever = match ContextRetriever::from_config(&config) {
            Ok(Some(retriever)) => Some(Arc::new(retriever)),
            Ok(None) => {
                info!("Knowledge base not configured, sessions use base instructions only");
                None
            }
            Err(e) => {
                warn!("Knowledge base unavailable: {}", e);
                None
            }
        };
        Self::with_retriever(config, retriever)
    }

    /// Build state with an explicit retriever.
    pub fn with_retriever(
        config: ServerConfig,
        retriever: Option<Arc<ContextRetriever>>,
    ) -> Arc<Self> {
        let hub = RelayHub::new(&config, retriever.clone());
        if hub.enhancement_enabled() {
            info!("Context enhancement enabled for live sessions");
        }
        Arc::new(Self {
            config,
            hub,
            retriever,
        })
    }
}
