//! Persistent connection to the OpenAI Realtime endpoint for one session.
//!
//! `UpstreamBridge::connect` performs the WebSocket handshake, sends the
//! initialization `session.update`, and spawns one I/O task that owns the
//! socket. Commands go in through a cloneable [`BridgeHandle`]; endpoint
//! frames come out of the returned receiver as [`BridgeEvent`]s, consumed by
//! exactly one task on the relay side.
//!
//! There is no reconnection. Once the socket closes the bridge is finished
//! and every later send through a handle is a silent no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::messages::{ClientEvent, SessionConfig};
use crate::core::realtime::base::{EndpointSettings, RealtimeError, RealtimeResult};

/// Capacity of the command channel into the I/O task.
const CONTROL_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the event channel out of the I/O task.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Events produced by a bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// One parsed JSON frame from the endpoint, untouched
    Frame(Value),
    /// The endpoint side closed. Emitted at most once, and never for a
    /// bridge the relay closed itself.
    Closed {
        code: Option<u16>,
        error: Option<String>,
    },
}

/// Human explanation for endpoint-specific close codes.
pub fn describe_close_code(code: u16) -> Option<&'static str> {
    match code {
        1000 => Some("normal closure"),
        1008 => Some("policy violation (check the request headers)"),
        4000 => Some("invalid request"),
        4001 => Some("invalid API key"),
        4003 => Some("rate limit exceeded or quota exhausted"),
        4004 => Some("model not available for this API key"),
        _ => None,
    }
}

/// Cheap cloneable sender side of a bridge.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    id: Uuid,
    control_tx: mpsc::Sender<ClientEvent>,
    ready: Arc<AtomicBool>,
}

impl BridgeHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True while the endpoint socket is open.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Queue a control frame. Fire-and-forget: a closed bridge drops it.
    pub async fn send_control(&self, event: ClientEvent) {
        if !self.is_ready() {
            debug!(bridge_id = %self.id, event = event.event_type(), "Bridge closed, dropping control frame");
            return;
        }
        if let Err(e) = self.control_tx.send(event).await {
            debug!(bridge_id = %self.id, event = e.0.event_type(), "Bridge closed, dropping control frame");
        }
    }

    /// Issue a `session.update` naming only the keys set in `patch`.
    pub async fn send_config_patch(&self, patch: SessionConfig) {
        if patch.is_empty() {
            debug!(bridge_id = %self.id, "Skipping empty session patch");
            return;
        }
        self.send_control(ClientEvent::SessionUpdate { session: patch })
            .await;
    }

    /// Issue a `session.update` carrying `session` exactly as given.
    pub async fn send_session_merge(&self, session: Map<String, Value>) {
        self.send_control(ClientEvent::SessionMerge { session }).await;
    }
}

/// Owner of the endpoint connection. Dropping it closes the socket.
#[derive(Debug)]
pub struct UpstreamBridge {
    handle: BridgeHandle,
    shutdown: CancellationToken,
}

impl UpstreamBridge {
    /// Open the endpoint connection and send the initialization frame.
    ///
    /// Returns once the socket is open and `initial` has been written, along
    /// with the receiver for endpoint events.
    pub async fn connect(
        settings: &EndpointSettings,
        initial: SessionConfig,
    ) -> RealtimeResult<(Self, mpsc::Receiver<BridgeEvent>)> {
        let request = build_request(settings)?;

        let (ws_stream, _response) =
            tokio::time::timeout(settings.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    RealtimeError::Timeout(format!(
                        "no handshake within {}s",
                        settings.connect_timeout.as_secs()
                    ))
                })?
                .map_err(map_handshake_error)?;

        let (mut ws_sink, ws_stream) = ws_stream.split();

        let init = serde_json::to_string(&ClientEvent::SessionUpdate { session: initial })
            .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
        ws_sink
            .send(Message::Text(init.into()))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;

        let id = Uuid::new_v4();
        info!(bridge_id = %id, model = %settings.model, "Connected to realtime endpoint");

        let (control_tx, control_rx) = mpsc::channel::<ClientEvent>(CONTROL_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<BridgeEvent>(EVENT_CHANNEL_CAPACITY);
        let ready = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        tokio::spawn(run_io(
            id,
            ws_sink,
            ws_stream,
            control_rx,
            event_tx,
            ready.clone(),
            shutdown.clone(),
        ));

        let bridge = Self {
            handle: BridgeHandle {
                id,
                control_tx,
                ready,
            },
            shutdown,
        };
        Ok((bridge, event_rx))
    }

    pub fn id(&self) -> Uuid {
        self.handle.id
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// Close the endpoint socket. Pending commands are discarded.
    pub fn close(&self) {
        self.handle.ready.store(false, Ordering::Release);
        self.shutdown.cancel();
    }
}

impl Drop for UpstreamBridge {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_request(
    settings: &EndpointSettings,
) -> RealtimeResult<tungstenite::handshake::client::Request> {
    let url = settings.connection_url()?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
        .map_err(|_| RealtimeError::InvalidConfiguration("API key is not a valid header".into()))?;
    let headers = request.headers_mut();
    headers.insert(http::header::AUTHORIZATION, bearer);
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    Ok(request)
}

fn map_handshake_error(err: tungstenite::Error) -> RealtimeError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
                RealtimeError::AuthenticationFailed(format!("endpoint returned {status}"))
            } else {
                RealtimeError::ConnectionFailed(format!("endpoint returned {status}"))
            }
        }
        other => RealtimeError::ConnectionFailed(other.to_string()),
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_io(
    id: Uuid,
    mut sink: futures_util::stream::SplitSink<WsStream, Message>,
    mut stream: futures_util::stream::SplitStream<WsStream>,
    mut control_rx: mpsc::Receiver<ClientEvent>,
    event_tx: mpsc::Sender<BridgeEvent>,
    ready: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let mut closed_locally = false;
    let mut close_code: Option<u16> = None;
    let mut close_error: Option<String> = None;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!(bridge_id = %id, "Closing realtime endpoint connection");
                closed_locally = true;
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            Some(event) = control_rx.recv() => {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(bridge_id = %id, "Failed to serialize control frame: {}", e);
                        continue;
                    }
                };
                debug!(bridge_id = %id, event = event.event_type(), "Sending control frame");
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    error!(bridge_id = %id, "Failed to send control frame: {}", e);
                    close_error = Some(format!("send failed: {e}"));
                    break;
                }
            }

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(frame) => {
                            if event_tx.send(BridgeEvent::Frame(frame)).await.is_err() {
                                debug!(bridge_id = %id, "Event receiver gone, closing bridge");
                                closed_locally = true;
                                let _ = sink.send(Message::Close(None)).await;
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(bridge_id = %id, "Dropping malformed endpoint frame: {}", e);
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        warn!(bridge_id = %id, "Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        let code = u16::from(frame.code);
                        info!(bridge_id = %id, code, reason = %frame.reason.as_str(), "Endpoint closed the connection");
                        close_code = Some(code);
                        if code != 1000 {
                            let detail = describe_close_code(code).unwrap_or("abnormal closure");
                            close_error = Some(format!("Endpoint closed the connection ({code}): {detail}"));
                        }
                    } else {
                        info!(bridge_id = %id, "Endpoint closed the connection");
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(bridge_id = %id, "Realtime endpoint connection error: {}", e);
                    close_error = Some(format!("Endpoint connection error: {e}"));
                    break;
                }
                None => {
                    info!(bridge_id = %id, "Realtime endpoint stream ended");
                    break;
                }
            }
        }
    }

    ready.store(false, Ordering::Release);

    if !closed_locally {
        let _ = event_tx
            .send(BridgeEvent::Closed {
                code: close_code,
                error: close_error,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn settings(url: String) -> EndpointSettings {
        EndpointSettings {
            url,
            model: "test-model".to_string(),
            api_key: "sk-test".to_string(),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Accepts one connection, forwards every text frame it receives and
    /// sends the scripted replies after the first frame.
    async fn spawn_endpoint(
        replies: Vec<Value>,
    ) -> (String, mpsc::UnboundedReceiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();
            let mut replied = false;
            while let Some(Ok(msg)) = read.next().await {
                if let Message::Text(text) = msg {
                    let _ = seen_tx.send(serde_json::from_str::<Value>(text.as_str()).unwrap());
                    if !replied {
                        replied = true;
                        for reply in &replies {
                            write
                                .send(Message::Text(reply.to_string().into()))
                                .await
                                .unwrap();
                        }
                    }
                }
            }
        });

        (format!("ws://{addr}/v1/realtime"), seen_rx)
    }

    #[tokio::test]
    async fn test_connect_sends_initialization_frame_first() {
        let (url, mut seen) = spawn_endpoint(vec![]).await;
        let initial = SessionConfig::instructions_patch("hello".into());

        let (bridge, _events) = UpstreamBridge::connect(&settings(url), initial).await.unwrap();
        assert!(bridge.is_ready());

        let first = seen.recv().await.unwrap();
        assert_eq!(first["type"], "session.update");
        assert_eq!(first["session"]["instructions"], "hello");

        bridge.handle().send_control(ClientEvent::InputAudioBufferCommit).await;
        let second = seen.recv().await.unwrap();
        assert_eq!(second["type"], "input_audio_buffer.commit");
    }

    #[tokio::test]
    async fn test_session_merge_reaches_endpoint_unchanged() {
        let (url, mut seen) = spawn_endpoint(vec![]).await;
        let (bridge, _events) =
            UpstreamBridge::connect(&settings(url), SessionConfig::default()).await.unwrap();
        let _init = seen.recv().await.unwrap();

        let session = serde_json::json!({
            "tools": [{"type": "function", "name": "lookup", "parameters": {}}],
            "turn_detection": null
        });
        bridge
            .handle()
            .send_session_merge(session.as_object().unwrap().clone())
            .await;

        let frame = seen.recv().await.unwrap();
        assert_eq!(frame, serde_json::json!({"type": "session.update", "session": session}));
    }

    #[tokio::test]
    async fn test_frames_are_delivered_verbatim() {
        let reply = serde_json::json!({"type": "session.created", "session": {"id": "sess_1"}});
        let (url, _seen) = spawn_endpoint(vec![reply.clone()]).await;

        let (_bridge, mut events) =
            UpstreamBridge::connect(&settings(url), SessionConfig::default()).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event, BridgeEvent::Frame(reply));
    }

    #[tokio::test]
    async fn test_send_after_close_is_silent_noop() {
        let (url, _seen) = spawn_endpoint(vec![]).await;
        let (bridge, _events) =
            UpstreamBridge::connect(&settings(url), SessionConfig::default()).await.unwrap();
        let handle = bridge.handle();

        bridge.close();
        assert!(!handle.is_ready());
        handle
            .send_config_patch(SessionConfig::instructions_patch("late".into()))
            .await;
        drop(bridge);
    }

    #[tokio::test]
    async fn test_remote_close_emits_single_closed_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let _ = ws
                .close(Some(tungstenite::protocol::CloseFrame {
                    code: tungstenite::protocol::frame::coding::CloseCode::from(4001),
                    reason: "invalid key".into(),
                }))
                .await;
        });

        let (bridge, mut events) = UpstreamBridge::connect(
            &settings(format!("ws://{addr}/")),
            SessionConfig::default(),
        )
        .await
        .unwrap();

        match events.recv().await.unwrap() {
            BridgeEvent::Closed { code, error } => {
                assert_eq!(code, Some(4001));
                assert!(error.unwrap().contains("invalid API key"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(events.recv().await.is_none());
        assert!(!bridge.is_ready());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = UpstreamBridge::connect(&settings(format!("ws://{addr}/")), SessionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::ConnectionFailed(_)));
    }

    #[test]
    fn test_describe_close_code() {
        assert_eq!(describe_close_code(4004), Some("model not available for this API key"));
        assert_eq!(describe_close_code(4999), None);
    }
}
