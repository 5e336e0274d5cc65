use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override whatever the environment provides.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///
/// providers:
///   openai_api_key: "sk-your-key"
///
/// realtime:
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview-2024-10-01"
///   base_instructions: "You are a helpful voice assistant."
///   connect_timeout_seconds: 10
///
/// knowledge:
///   enabled: true
///   supabase_url: "https://project.supabase.co"
///   supabase_anon_key: "anon-key"
///   api_base: "https://api.openai.com/v1"
///   embedding_model: "text-embedding-3-small"
///   classifier: "keyword"
///   classifier_model: "gpt-3.5-turbo"
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub knowledge: Option<KnowledgeYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Provider credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// OpenAI API key for the Realtime endpoint, embeddings and classification
    pub openai_api_key: Option<String>,
}

/// Realtime endpoint settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub url: Option<String>,
    pub model: Option<String>,
    pub base_instructions: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
}

/// Knowledge base settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct KnowledgeYaml {
    pub enabled: Option<bool>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub api_base: Option<String>,
    pub embedding_model: Option<String>,
    /// "keyword" or "openai"
    pub classifier: Option<String>,
    pub classifier_model: Option<String>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

impl YamlConfig {
    /// Load a YAML configuration file from disk
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        Self::from_str(&contents)
    }

    /// Parse YAML configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: YamlConfig = serde_yaml::from_str(contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;
        Ok(config)
    }
}
