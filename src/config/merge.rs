//! YAML-over-environment merging

use super::yaml::YamlConfig;
use super::{ClassifierKind, ServerConfig, env};

/// Merge YAML overrides on top of the environment-derived configuration
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
    }

    if let Some(providers) = yaml.providers {
        if providers.openai_api_key.is_some() {
            config.openai_api_key = providers.openai_api_key;
        }
    }

    if let Some(realtime) = yaml.realtime {
        if let Some(url) = realtime.url {
            config.realtime_url = url;
        }
        if let Some(model) = realtime.model {
            config.realtime_model = model;
        }
        if let Some(instructions) = realtime.base_instructions {
            config.base_instructions = instructions;
        }
        if let Some(timeout) = realtime.connect_timeout_seconds {
            config.upstream_connect_timeout_seconds = timeout;
        }
    }

    if let Some(knowledge) = yaml.knowledge {
        if let Some(enabled) = knowledge.enabled {
            config.context_enhancement = enabled;
        }
        if knowledge.supabase_url.is_some() {
            config.supabase_url = knowledge.supabase_url;
        }
        if knowledge.supabase_anon_key.is_some() {
            config.supabase_anon_key = knowledge.supabase_anon_key;
        }
        if let Some(api_base) = knowledge.api_base {
            config.openai_api_base = api_base;
        }
        if let Some(model) = knowledge.embedding_model {
            config.embedding_model = model;
        }
        if let Some(raw) = knowledge.classifier {
            config.classifier = ClassifierKind::parse(&raw)
                .ok_or_else(|| format!("Invalid knowledge.classifier: '{raw}'"))?;
        }
        if let Some(model) = knowledge.classifier_model {
            config.classifier_model = model;
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
    }

    Ok(config)
}
