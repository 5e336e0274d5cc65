//! Endpoint connectivity check for the `voice-relay probe` CLI command.
//!
//! Opens a realtime session with the configured key and model, sends the
//! initialization frame and waits for the endpoint to acknowledge it.

use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::realtime::openai::{
    OpenAIRealtimeVoice, describe_close_code, event_type,
};
use crate::core::realtime::{BridgeEvent, EndpointSettings, SessionConfig, UpstreamBridge};

/// What the endpoint answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Event types received before the session was acknowledged
    pub events: Vec<String>,
}

/// Whether a key looks like an OpenAI secret key.
pub fn key_looks_valid(key: &str) -> bool {
    key.starts_with("sk-")
}

/// Human explanation for a close code, for terminal output.
pub fn explain_close(code: Option<u16>) -> String {
    match code {
        Some(code) => match describe_close_code(code) {
            Some(description) => format!("closed with code {code} ({description})"),
            None => format!("closed with code {code}"),
        },
        None => "closed without a close frame".to_string(),
    }
}

/// Connect and wait for `session.created` / `session.updated`.
pub async fn run(config: &ServerConfig) -> Result<ProbeReport> {
    let api_key = config.openai_key().map_err(|e| anyhow!(e))?;
    if !key_looks_valid(&api_key) {
        warn!("OPENAI_API_KEY does not start with \"sk-\", it is probably not a valid key");
    }

    let settings = EndpointSettings {
        url: config.realtime_url.clone(),
        model: config.realtime_model.clone(),
        api_key,
        connect_timeout: config.connect_timeout(),
    };
    info!(url = %settings.url, model = %settings.model, "Probing realtime endpoint");

    let initial = SessionConfig::initial(
        OpenAIRealtimeVoice::default(),
        config.base_instructions.clone(),
        None,
        None,
        None,
        None,
    );
    let (bridge, mut events) = UpstreamBridge::connect(&settings, initial)
        .await
        .map_err(|e| anyhow!("Connection failed: {e}"))?;

    let mut report = ProbeReport { events: Vec::new() };
    let deadline = tokio::time::sleep(settings.connect_timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(BridgeEvent::Frame(frame)) => {
                    let kind = event_type(&frame).unwrap_or("<untyped>").to_string();
                    info!("Received {}", kind);
                    if kind == "error" {
                        let message = frame
                            .pointer("/error/message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown error")
                            .to_string();
                        break Err(anyhow!("Endpoint reported an error: {message}"));
                    }
                    let acknowledged = kind == "session.created" || kind == "session.updated";
                    report.events.push(kind);
                    if acknowledged {
                        break Ok(());
                    }
                }
                Some(BridgeEvent::Closed { code, error }) => {
                    let detail = error.map(|e| format!(": {e}")).unwrap_or_default();
                    break Err(anyhow!("Endpoint {}{}", explain_close(code), detail));
                }
                None => break Err(anyhow!("Endpoint connection ended unexpectedly")),
            },
            _ = &mut deadline => {
                bail!(
                    "No session acknowledgement within {}s",
                    settings.connect_timeout.as_secs()
                );
            }
        }
    };

    bridge.close();
    outcome.map(|_| report)
}
