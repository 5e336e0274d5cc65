//! Configuration module for the voice relay server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod yaml;

pub use yaml::YamlConfig;

/// Default values shared by the env and YAML loaders
pub(crate) mod defaults {
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8080;
    pub const REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";
    pub const REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";
    pub const BASE_INSTRUCTIONS: &str =
        "You are a helpful voice assistant. Be concise and natural in your responses.";
    pub const CONNECT_TIMEOUT_SECONDS: u64 = 10;
    pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
    pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
    pub const CLASSIFIER_MODEL: &str = "gpt-3.5-turbo";
    pub const RATE_LIMIT_RPS: u32 = 60;
    pub const RATE_LIMIT_BURST: u32 = 10;
}

/// Which classification pass feeds the retrieval filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierKind {
    /// Keyword tables, no network round trip
    #[default]
    Keyword,
    /// Chat completion against the OpenAI API
    OpenAI,
}

impl ClassifierKind {
    /// Parse a classifier selector, case-insensitive
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "keyword" | "keywords" => Some(Self::Keyword),
            "openai" | "llm" => Some(Self::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::OpenAI => "openai",
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the relay, including:
/// - Server settings (host, port)
/// - Realtime endpoint settings (URL, model, base instructions)
/// - Knowledge base settings (Supabase, embeddings, classifier)
/// - Security settings (CORS, rate limiting)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    /// OpenAI API key for the Realtime endpoint, embeddings and classification
    pub openai_api_key: Option<String>,

    // Realtime endpoint
    pub realtime_url: String,
    pub realtime_model: String,
    /// Instructions sent in the initialization frame unless the client overrides them
    pub base_instructions: String,
    pub upstream_connect_timeout_seconds: u64,

    // Knowledge base
    /// Base URL for the embeddings and chat completion APIs
    pub openai_api_base: String,
    pub embedding_model: String,
    pub classifier: ClassifierKind,
    pub classifier_model: String,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    /// Master switch for mid-session instruction enhancement
    pub context_enhancement: bool,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            openai_api_key: None,
            realtime_url: defaults::REALTIME_URL.to_string(),
            realtime_model: defaults::REALTIME_MODEL.to_string(),
            base_instructions: defaults::BASE_INSTRUCTIONS.to_string(),
            upstream_connect_timeout_seconds: defaults::CONNECT_TIMEOUT_SECONDS,
            openai_api_base: defaults::OPENAI_API_BASE.to_string(),
            embedding_model: defaults::EMBEDDING_MODEL.to_string(),
            classifier: ClassifierKind::Keyword,
            classifier_model: defaults::CLASSIFIER_MODEL.to_string(),
            supabase_url: None,
            supabase_anon_key: None,
            context_enhancement: true,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: defaults::RATE_LIMIT_RPS,
            rate_limit_burst_size: defaults::RATE_LIMIT_BURST,
        }
    }
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.supabase_anon_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and defaults)
    ///
    /// The `.env` file is loaded in main.rs before this is called, so its
    /// values are visible here as ordinary environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.realtime_url.starts_with("ws://") || self.realtime_url.starts_with("wss://")) {
            return Err(format!(
                "Realtime URL must use ws:// or wss://, got '{}'",
                self.realtime_url
            ));
        }
        if self.upstream_connect_timeout_seconds == 0 {
            return Err("Upstream connect timeout must be greater than zero".to_string());
        }
        if self.rate_limit_burst_size == 0 {
            return Err("Rate limit burst size must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the OpenAI API key or a client-presentable error message
    pub fn openai_key(&self) -> Result<String, String> {
        self.openai_api_key
            .as_ref()
            .cloned()
            .ok_or_else(|| "OpenAI API key not configured in server environment".to_string())
    }

    pub fn has_openai(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// Check if the Supabase document store is configured
    pub fn has_vector_store(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }

    /// Whether live sessions should enhance their instructions from the knowledge base
    pub fn knowledge_enabled(&self) -> bool {
        self.context_enhancement && self.has_vector_store() && self.has_openai()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_seconds)
    }
}
