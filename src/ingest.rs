//! Knowledge base ingestion for the `voice-relay ingest` CLI command.
//!
//! Every `.txt` file in a directory is embedded and stored with metadata
//! inferred from its filename and content:
//!
//! ```text
//! $ voice-relay ingest ./knowledge --project-type ai_ml
//! ```
//!
//! A file that fails is reported and the remaining files are still uploaded.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::core::context::{ContextRetriever, extract_metadata};

/// Outcome of one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub uploaded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Metadata values applied to every file, winning over inferred ones.
pub fn overrides(project_type: Option<String>, service_type: Option<String>) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(project) = project_type {
        map.insert("project_type".into(), json!(project));
    }
    if let Some(service) = service_type {
        map.insert("service_type".into(), json!(service));
    }
    map
}

/// Text files of `dir` in name order.
fn text_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();
    Ok(files)
}

/// Upload all text files in `dir` through `retriever`.
pub async fn run(
    retriever: &ContextRetriever,
    dir: &Path,
    overrides: &Map<String, Value>,
) -> Result<IngestSummary> {
    let files = text_files(dir)?;
    info!("Found {} text file(s) in {}", files.len(), dir.display());

    let mut summary = IngestSummary::default();
    for path in files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                summary.failed.push((filename, e.to_string()));
                continue;
            }
        };

        let metadata = extract_metadata(&filename, &content, overrides);
        match retriever.add_document(&content, metadata).await {
            Ok(document) => {
                info!(id = ?document.id, "Uploaded {}", filename);
                summary.uploaded.push(filename);
            }
            Err(e) => {
                error!("Failed to upload {}: {}", filename, e);
                summary.failed.push((filename, e.to_string()));
            }
        }
    }

    info!(
        "Ingestion finished: {} uploaded, {} failed",
        summary.uploaded.len(),
        summary.failed.len()
    );
    Ok(summary)
}

/// Build the production collaborators from `config` and ingest `dir`.
pub async fn run_with_config(
    config: &ServerConfig,
    dir: &Path,
    overrides: &Map<String, Value>,
) -> Result<IngestSummary> {
    let retriever = ContextRetriever::from_config(config)
        .map_err(|e| anyhow!(e.to_string()))?
        .ok_or_else(|| {
            anyhow!(
                "`voice-relay ingest` requires SUPABASE_URL, SUPABASE_ANON_KEY and OPENAI_API_KEY"
            )
        })?;
    run(&retriever, dir, overrides).await
}
