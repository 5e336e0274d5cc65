//! Environment variable loading

use std::env;
use std::str::FromStr;

use super::{ClassifierKind, ServerConfig, defaults};

/// Read an environment variable, treating empty values as unset
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} ('{raw}'): {e}")),
        None => Ok(None),
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bool_var(name: &str) -> Result<Option<bool>, String> {
    match var(name) {
        Some(raw) => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| format!("Invalid boolean for {name}: '{raw}'")),
        None => Ok(None),
    }
}

/// Build a configuration from environment variables and defaults
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let classifier = match var("CONTEXT_CLASSIFIER") {
        Some(raw) => ClassifierKind::parse(&raw)
            .ok_or_else(|| format!("Invalid value for CONTEXT_CLASSIFIER: '{raw}'"))?,
        None => ClassifierKind::Keyword,
    };

    Ok(ServerConfig {
        host: var("HOST").unwrap_or_else(|| defaults::HOST.to_string()),
        port: parse_var("PORT")?.unwrap_or(defaults::PORT),
        openai_api_key: var("OPENAI_API_KEY"),
        realtime_url: var("OPENAI_REALTIME_URL")
            .unwrap_or_else(|| defaults::REALTIME_URL.to_string()),
        realtime_model: var("OPENAI_REALTIME_MODEL")
            .unwrap_or_else(|| defaults::REALTIME_MODEL.to_string()),
        base_instructions: var("BASE_INSTRUCTIONS")
            .unwrap_or_else(|| defaults::BASE_INSTRUCTIONS.to_string()),
        upstream_connect_timeout_seconds: parse_var("UPSTREAM_CONNECT_TIMEOUT_SECONDS")?
            .unwrap_or(defaults::CONNECT_TIMEOUT_SECONDS),
        openai_api_base: var("OPENAI_API_BASE")
            .unwrap_or_else(|| defaults::OPENAI_API_BASE.to_string()),
        embedding_model: var("EMBEDDING_MODEL")
            .unwrap_or_else(|| defaults::EMBEDDING_MODEL.to_string()),
        classifier,
        classifier_model: var("CLASSIFIER_MODEL")
            .unwrap_or_else(|| defaults::CLASSIFIER_MODEL.to_string()),
        supabase_url: var("SUPABASE_URL"),
        supabase_anon_key: var("SUPABASE_ANON_KEY"),
        context_enhancement: bool_var("CONTEXT_ENHANCEMENT")?.unwrap_or(true),
        cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
        rate_limit_requests_per_second: parse_var("RATE_LIMIT_REQUESTS_PER_SECOND")?
            .unwrap_or(defaults::RATE_LIMIT_RPS),
        rate_limit_burst_size: parse_var("RATE_LIMIT_BURST_SIZE")?
            .unwrap_or(defaults::RATE_LIMIT_BURST),
    })
}
