//! Connection registry and per-connection dispatch.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::core::context::{ContextRetriever, ConversationTurn, InstructionComposer};
use crate::core::realtime::openai::{
    TRANSCRIPTION_COMPLETED, RESPONSE_DONE, TrackedServerEvent, describe_close_code, event_type,
    is_forwarded,
};
use crate::core::realtime::{
    BridgeEvent, BridgeHandle, ClientEvent, EndpointSettings, SessionConfig, UpstreamBridge,
};

use super::messages::{
    ClientSessionConfig, RelayIncomingMessage, RelayMessageRoute, RelayOutgoingMessage,
    update_instructions,
};
use super::session::SessionState;

/// Capacity of the enhancement result channel of one upstream task.
const ENHANCEMENT_CHANNEL_CAPACITY: usize = 4;

/// One live client transport.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    outbound: mpsc::Sender<RelayMessageRoute>,
    session: Mutex<SessionState>,
}

impl Connection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame for the client. Best effort: a gone transport drops it.
    pub async fn send(&self, message: RelayOutgoingMessage) {
        if self
            .outbound
            .send(RelayMessageRoute::Outgoing(message))
            .await
            .is_err()
        {
            debug!(connection_id = %self.id, "Client transport gone, dropping frame");
        }
    }

    pub async fn send_error(&self, code: &str, message: impl Into<String>) {
        self.send(RelayOutgoingMessage::error(code, message)).await;
    }

    /// Current bridge, if a session is live.
    pub fn bridge(&self) -> Option<BridgeHandle> {
        self.session.lock().bridge_handle()
    }

    pub fn session(&self) -> &Mutex<SessionState> {
        &self.session
    }

    /// Whether `bridge_id` is still this connection's live bridge.
    fn is_current(&self, bridge_id: Uuid) -> bool {
        self.session.lock().current_bridge_id() == Some(bridge_id)
    }
}

/// Retrieval and composition used by the enhancement cycle.
#[derive(Debug, Clone)]
struct Enhancer {
    retriever: Arc<ContextRetriever>,
    composer: InstructionComposer,
}

impl Enhancer {
    async fn run(&self, transcript: &str, history: &[ConversationTurn], base: &str) -> String {
        let retrieved = self.retriever.retrieve(transcript, history).await;
        self.composer.compose(base, &retrieved)
    }
}

/// Owns all live connections and routes their frames.
#[derive(Debug)]
pub struct RelayHub {
    connections: DashMap<Uuid, Arc<Connection>>,
    endpoint: Option<EndpointSettings>,
    base_instructions: String,
    enhancer: Option<Enhancer>,
}

impl RelayHub {
    /// `retriever` is ignored when context enhancement is disabled.
    pub fn new(config: &ServerConfig, retriever: Option<Arc<ContextRetriever>>) -> Self {
        let endpoint = config.openai_api_key.as_ref().map(|key| EndpointSettings {
            url: config.realtime_url.clone(),
            model: config.realtime_model.clone(),
            api_key: key.clone(),
            connect_timeout: config.connect_timeout(),
        });

        let enhancer = retriever
            .filter(|_| config.context_enhancement)
            .map(|retriever| Enhancer {
                retriever,
                composer: InstructionComposer::default(),
            });

        Self {
            connections: DashMap::new(),
            endpoint,
            base_instructions: config.base_instructions.clone(),
            enhancer,
        }
    }

    pub fn enhancement_enabled(&self) -> bool {
        self.enhancer.is_some()
    }

    /// Register a client transport and assign it a fresh id.
    pub fn register(&self, outbound: mpsc::Sender<RelayMessageRoute>) -> Arc<Connection> {
        let id = Uuid::new_v4();
        let connection = Arc::new(Connection {
            id,
            outbound,
            session: Mutex::new(SessionState::new(self.base_instructions.clone())),
        });
        self.connections.insert(id, connection.clone());
        info!(connection_id = %id, connections = self.connections.len(), "Client connected");
        connection
    }

    /// Drop a connection and close its bridge.
    pub fn remove(&self, id: Uuid) -> bool {
        let Some((_, connection)) = self.connections.remove(&id) else {
            return false;
        };
        if let Some(bridge) = connection.session.lock().detach() {
            debug!(connection_id = %id, bridge_id = %bridge.id(), "Closing upstream bridge");
            bridge.close();
        }
        info!(connection_id = %id, connections = self.connections.len(), "Client disconnected");
        true
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Handle one decoded client frame. Callers await this before reading the
    /// next frame of the same connection.
    pub async fn dispatch(&self, connection: &Arc<Connection>, message: RelayIncomingMessage) {
        debug!(connection_id = %connection.id, kind = message.kind(), "Dispatching client frame");

        match message {
            RelayIncomingMessage::StartSession { config } => {
                self.start_session(connection, config).await;
            }
            RelayIncomingMessage::AudioData { audio } => {
                if audio.is_empty() {
                    warn!(connection_id = %connection.id, "Dropping empty audio frame");
                    return;
                }
                let Some(bridge) = active_bridge(connection, "audio_data") else {
                    return;
                };
                bridge
                    .send_control(ClientEvent::InputAudioBufferAppend { audio })
                    .await;
            }
            RelayIncomingMessage::CommitAudio => {
                let Some(bridge) = active_bridge(connection, "commit_audio") else {
                    return;
                };
                connection.session.lock().on_commit();
                bridge.send_control(ClientEvent::InputAudioBufferCommit).await;
                bridge.send_control(ClientEvent::ResponseCreate).await;
            }
            RelayIncomingMessage::ClearAudio => {
                if let Some(bridge) = active_bridge(connection, "clear_audio") {
                    bridge.send_control(ClientEvent::InputAudioBufferClear).await;
                }
            }
            RelayIncomingMessage::Interrupt => {
                if let Some(bridge) = active_bridge(connection, "interrupt") {
                    bridge.send_control(ClientEvent::ResponseCancel).await;
                }
            }
            RelayIncomingMessage::UpdateSession { session } => {
                let Some(bridge) = active_bridge(connection, "update_session") else {
                    return;
                };
                if let Some(instructions) = update_instructions(&session) {
                    connection
                        .session
                        .lock()
                        .set_base_instructions(instructions.to_string());
                }
                bridge.send_session_merge(session).await;
            }
        }
    }

    async fn start_session(&self, connection: &Arc<Connection>, config: ClientSessionConfig) {
        let Some(endpoint) = &self.endpoint else {
            warn!(connection_id = %connection.id, "start_session without an OpenAI API key");
            connection
                .send_error(
                    "missing_api_key",
                    "OpenAI API key not configured in server environment",
                )
                .await;
            return;
        };

        // At most one bridge per connection
        if let Some(previous) = connection.session.lock().detach() {
            info!(connection_id = %connection.id, bridge_id = %previous.id(), "Replacing live session");
            previous.close();
        }

        let base = config
            .instructions
            .clone()
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| self.base_instructions.clone());
        let initial = config.into_initial(&base);

        let (bridge, events) = match UpstreamBridge::connect(endpoint, initial).await {
            Ok(connected) => connected,
            Err(e) => {
                error!(connection_id = %connection.id, "Failed to connect to realtime endpoint: {}", e);
                connection
                    .send_error("connection_error", format!("Failed to connect to OpenAI: {e}"))
                    .await;
                return;
            }
        };

        let handle = bridge.handle();
        if let Some(stale) = connection.session.lock().attach(bridge, base) {
            stale.close();
        }

        connection
            .send(RelayOutgoingMessage::SessionStarted {
                session_id: handle.id().to_string(),
            })
            .await;

        tokio::spawn(run_upstream(
            connection.clone(),
            handle,
            events,
            self.enhancer.clone(),
        ));
    }
}

fn active_bridge(connection: &Connection, kind: &str) -> Option<BridgeHandle> {
    let bridge = connection.bridge();
    if bridge.is_none() {
        warn!(connection_id = %connection.id, kind, "No active session, dropping frame");
    }
    bridge
}

/// Consume one bridge's events until it closes.
async fn run_upstream(
    connection: Arc<Connection>,
    bridge: BridgeHandle,
    mut events: mpsc::Receiver<BridgeEvent>,
    enhancer: Option<Enhancer>,
) {
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<String>(ENHANCEMENT_CHANNEL_CAPACITY);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(BridgeEvent::Frame(frame)) => {
                    // Frames still buffered from a replaced session are dropped
                    if !track_frame(&connection, bridge.id(), &frame, enhancer.as_ref(), &outcome_tx) {
                        break;
                    }
                    forward_frame(&connection, frame).await;
                }
                Some(BridgeEvent::Closed { code, error }) => {
                    on_bridge_closed(&connection, &bridge, code, error).await;
                    break;
                }
                // Closed by the relay
                None => break,
            },
            Some(instructions) = outcome_rx.recv() => {
                if !connection.is_current(bridge.id()) {
                    break;
                }
                bridge
                    .send_config_patch(SessionConfig::instructions_patch(instructions))
                    .await;
                {
                    let mut session = connection.session.lock();
                    if session.current_bridge_id() == Some(bridge.id()) {
                        session.finish_enhancement();
                    }
                }
                debug!(connection_id = %connection.id, "Session instructions updated with context");
            }
        }
    }

    debug!(connection_id = %connection.id, bridge_id = %bridge.id(), "Upstream task finished");
}

async fn forward_frame(connection: &Connection, frame: Value) {
    let Some(kind) = event_type(&frame) else {
        warn!(connection_id = %connection.id, "Dropping endpoint frame without a type");
        return;
    };
    if !is_forwarded(kind) {
        debug!(connection_id = %connection.id, kind, "Dropping unlisted endpoint event");
        return;
    }
    connection
        .send(RelayOutgoingMessage::OpenaiMessage { data: frame })
        .await;
}

/// History bookkeeping and enhancement trigger. Never waits on retrieval.
///
/// Returns false when `bridge_id` no longer owns the session, in which case
/// nothing is recorded and the frame must not be forwarded.
fn track_frame(
    connection: &Connection,
    bridge_id: Uuid,
    frame: &Value,
    enhancer: Option<&Enhancer>,
    outcome_tx: &mpsc::Sender<String>,
) -> bool {
    if !matches!(event_type(frame), Some(TRANSCRIPTION_COMPLETED | RESPONSE_DONE)) {
        return connection.is_current(bridge_id);
    }
    let event = match TrackedServerEvent::deserialize(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!(connection_id = %connection.id, "Malformed endpoint event: {}", e);
            return connection.is_current(bridge_id);
        }
    };

    match event {
        TrackedServerEvent::TranscriptionCompleted { transcript, .. } => {
            let transcript = transcript.trim().to_string();
            let (start, history, base) = {
                let mut session = connection.session.lock();
                if session.current_bridge_id() != Some(bridge_id) {
                    return false;
                }
                let start = session.begin_enhancement();
                let history = session.history().snapshot();
                let base = session.base_instructions().to_string();
                if !transcript.is_empty() {
                    session.record(ConversationTurn::user(transcript.clone()));
                }
                (start, history, base)
            };
            if !start {
                return true;
            }

            match enhancer {
                Some(enhancer) if !transcript.is_empty() => {
                    debug!(connection_id = %connection.id, "Starting context enhancement");
                    let enhancer = enhancer.clone();
                    let outcome_tx = outcome_tx.clone();
                    tokio::spawn(async move {
                        let instructions = enhancer.run(&transcript, &history, &base).await;
                        // The upstream task is gone if the session ended
                        let _ = outcome_tx.send(instructions).await;
                    });
                }
                _ => connection.session.lock().finish_enhancement(),
            }
            true
        }
        TrackedServerEvent::ResponseDone { response } => {
            let text = response.assistant_text();
            let mut session = connection.session.lock();
            if session.current_bridge_id() != Some(bridge_id) {
                return false;
            }
            if !text.is_empty() {
                session.record(ConversationTurn::assistant(text));
            }
            true
        }
    }
}

async fn on_bridge_closed(
    connection: &Connection,
    bridge: &BridgeHandle,
    code: Option<u16>,
    error: Option<String>,
) {
    let detached = connection.session.lock().detach_if(bridge.id());
    if detached.is_none() {
        debug!(connection_id = %connection.id, bridge_id = %bridge.id(), "Replaced bridge closed");
        return;
    }
    drop(detached);

    let reason = code.map(|code| match describe_close_code(code) {
        Some(description) => format!("{code}: {description}"),
        None => code.to_string(),
    });
    info!(
        connection_id = %connection.id,
        bridge_id = %bridge.id(),
        reason = reason.as_deref().unwrap_or("none"),
        "Realtime endpoint closed the session"
    );

    if let Some(error) = error {
        connection.send_error("upstream_error", error).await;
    }
    connection
        .send(RelayOutgoingMessage::SessionEnded { reason })
        .await;
}
