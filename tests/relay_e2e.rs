//! End-to-end relay tests
//!
//! Runs the real server on a random port with the mock realtime endpoint
//! and an in-memory knowledge base, and drives it with a WebSocket client.

mod mock_providers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use mock_providers::websocket_mock::EndpointObservation;
use mock_providers::{FakeKnowledge, MockRealtimeEndpoint};
use voice_relay::core::context::ContextRetriever;
use voice_relay::{ServerConfig, routes, state::AppState};

type ClientSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn relay_config(realtime_url: &str, api_key: Option<&str>) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.openai_api_key = api_key.map(str::to_string);
    config.realtime_url = realtime_url.to_string();
    config.base_instructions = "You are a helpful assistant.".to_string();
    config.upstream_connect_timeout_seconds = 2;
    config
}

async fn start_server(
    config: ServerConfig,
    retriever: Option<Arc<ContextRetriever>>,
) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::with_retriever(config, retriever);
    let app = routes::api::create_api_router()
        .merge(routes::relay::create_relay_router())
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (addr, state)
}

async fn connect_client(addr: SocketAddr) -> ClientSocket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("client should connect to the relay");
    socket
}

async fn send_json(socket: &mut ClientSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next JSON frame sent by the relay to the client.
async fn recv_json(socket: &mut ClientSocket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for the relay")
            .expect("relay closed the client socket")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Start a session and consume the handshake on both sides.
async fn open_session(client: &mut ClientSocket, endpoint: &mut MockRealtimeEndpoint) -> Value {
    send_json(
        client,
        json!({"type": "start_session", "config": {"voice": "alloy"}}),
    )
    .await;

    let init = endpoint.next_frame().await;

    let started = recv_json(client).await;
    assert_eq!(started["type"], "session_started");
    assert!(started["session_id"].as_str().is_some_and(|id| !id.is_empty()));

    let created = recv_json(client).await;
    assert_eq!(created["type"], "openai_message");
    assert_eq!(created["data"]["type"], "session.created");
    let updated = recv_json(client).await;
    assert_eq!(updated["data"]["type"], "session.updated");

    init
}

fn transcript_event(text: &str) -> Value {
    json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "item_id": "item_1",
        "content_index": 0,
        "transcript": text
    })
}

#[tokio::test]
async fn test_full_turn_with_context_enhancement() {
    let mut endpoint = MockRealtimeEndpoint::start().await;
    let knowledge = FakeKnowledge::with_document("We build chatbots with RAG pipelines.");
    let (addr, state) = start_server(
        relay_config(&endpoint.url, Some("sk-test")),
        Some(knowledge.retriever.clone()),
    )
    .await;
    let mut client = connect_client(addr).await;

    // Session initialization
    let init = open_session(&mut client, &mut endpoint).await;
    assert_eq!(init["type"], "session.update");
    assert_eq!(init["session"]["voice"], "alloy");
    assert_eq!(init["session"]["input_audio_format"], "pcm16");
    assert_eq!(init["session"]["output_audio_format"], "pcm16");
    assert_eq!(init["session"]["input_audio_transcription"]["model"], "whisper-1");
    assert_eq!(init["session"]["instructions"], "You are a helpful assistant.");

    // Audio then commit, in order
    let chunks: Vec<String> = (0u8..3)
        .map(|i| base64::engine::general_purpose::STANDARD.encode([i; 32]))
        .collect();
    for chunk in &chunks {
        send_json(&mut client, json!({"type": "audio_data", "audio": chunk})).await;
    }
    send_json(&mut client, json!({"type": "commit_audio"})).await;

    for chunk in &chunks {
        let append = endpoint.next_frame().await;
        assert_eq!(append["type"], "input_audio_buffer.append");
        assert_eq!(append["audio"], chunk.as_str());
    }
    assert_eq!(endpoint.next_frame().await["type"], "input_audio_buffer.commit");
    assert_eq!(endpoint.next_frame().await["type"], "response.create");

    // The transcript is relayed and triggers exactly one instruction update
    endpoint.send(transcript_event("hello"));

    let relayed = recv_json(&mut client).await;
    assert_eq!(relayed["type"], "openai_message");
    assert_eq!(relayed["data"]["transcript"], "hello");

    let patch = endpoint.next_frame().await;
    assert_eq!(patch["type"], "session.update");
    let instructions = patch["session"]["instructions"].as_str().unwrap();
    assert!(instructions.starts_with("You are a helpful assistant."));
    assert!(instructions.contains("We build chatbots with RAG pipelines."));
    assert!(patch["session"].get("voice").is_none());

    assert!(endpoint.stays_quiet(Duration::from_millis(300)).await);
    assert_eq!(knowledge.retrievals(), 1);
    {
        let seen = knowledge.classifier.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "hello");
        assert!(seen[0].1.is_empty());
    }

    // A transcript without a preceding commit does not trigger retrieval
    endpoint.send(transcript_event("again"));
    let relayed = recv_json(&mut client).await;
    assert_eq!(relayed["data"]["transcript"], "again");
    assert!(endpoint.stays_quiet(Duration::from_millis(300)).await);
    assert_eq!(knowledge.retrievals(), 1);

    // Client disconnect closes the upstream connection
    client.close(None).await.unwrap();
    endpoint.wait_closed().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !state.hub.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "connection not removed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_unlisted_events_are_not_forwarded() {
    let mut endpoint = MockRealtimeEndpoint::start().await;
    let (addr, _state) = start_server(relay_config(&endpoint.url, Some("sk-test")), None).await;
    let mut client = connect_client(addr).await;
    open_session(&mut client, &mut endpoint).await;

    endpoint.send(json!({"type": "some.internal.event", "detail": 1}));
    endpoint.send(json!({"type": "response.audio.delta", "delta": "AAAA"}));

    let next = recv_json(&mut client).await;
    assert_eq!(next["type"], "openai_message");
    assert_eq!(next["data"]["type"], "response.audio.delta");
    assert_eq!(next["data"]["delta"], "AAAA");
}

#[tokio::test]
async fn test_commit_without_enhancement_sends_no_patch() {
    let mut endpoint = MockRealtimeEndpoint::start().await;
    let mut config = relay_config(&endpoint.url, Some("sk-test"));
    config.context_enhancement = false;
    let knowledge = FakeKnowledge::with_document("unused");
    let (addr, _state) = start_server(config, Some(knowledge.retriever.clone())).await;
    let mut client = connect_client(addr).await;
    open_session(&mut client, &mut endpoint).await;

    send_json(&mut client, json!({"type": "commit_audio"})).await;
    assert_eq!(endpoint.next_frame().await["type"], "input_audio_buffer.commit");
    assert_eq!(endpoint.next_frame().await["type"], "response.create");

    endpoint.send(transcript_event("what do you charge?"));
    let relayed = recv_json(&mut client).await;
    assert_eq!(relayed["data"]["transcript"], "what do you charge?");

    assert!(endpoint.stays_quiet(Duration::from_millis(300)).await);
    assert_eq!(knowledge.retrievals(), 0);
}

#[tokio::test]
async fn test_interrupt_and_clear_map_to_endpoint_events() {
    let mut endpoint = MockRealtimeEndpoint::start().await;
    let (addr, _state) = start_server(relay_config(&endpoint.url, Some("sk-test")), None).await;
    let mut client = connect_client(addr).await;
    open_session(&mut client, &mut endpoint).await;

    send_json(&mut client, json!({"type": "interrupt"})).await;
    send_json(&mut client, json!({"type": "clear_audio"})).await;
    send_json(
        &mut client,
        json!({"type": "update_session", "session": {"temperature": 0.6}}),
    )
    .await;

    assert_eq!(endpoint.next_frame().await["type"], "response.cancel");
    assert_eq!(endpoint.next_frame().await["type"], "input_audio_buffer.clear");
    let update = endpoint.next_frame().await;
    assert_eq!(update["type"], "session.update");
    assert_eq!(update["session"]["temperature"], 0.6);
}

#[tokio::test]
async fn test_update_session_forwards_every_key() {
    let mut endpoint = MockRealtimeEndpoint::start().await;
    let knowledge = FakeKnowledge::with_document("Pricing starts at $5k.");
    let (addr, _state) = start_server(
        relay_config(&endpoint.url, Some("sk-test")),
        Some(knowledge.retriever.clone()),
    )
    .await;
    let mut client = connect_client(addr).await;
    open_session(&mut client, &mut endpoint).await;

    let session = json!({
        "instructions": "Answer in one sentence.",
        "tools": [{
            "type": "function",
            "name": "lookup_pricing",
            "description": "Price list for a service",
            "parameters": {"type": "object", "properties": {"service": {"type": "string"}}}
        }],
        "tool_choice": "auto",
        "turn_detection": null
    });
    send_json(
        &mut client,
        json!({"type": "update_session", "session": session.clone()}),
    )
    .await;

    let update = endpoint.next_frame().await;
    assert_eq!(update, json!({"type": "session.update", "session": session}));

    // Later enhancements build on the updated instructions
    send_json(&mut client, json!({"type": "commit_audio"})).await;
    assert_eq!(endpoint.next_frame().await["type"], "input_audio_buffer.commit");
    assert_eq!(endpoint.next_frame().await["type"], "response.create");
    endpoint.send(transcript_event("how much is a chatbot?"));
    recv_json(&mut client).await;

    let patch = endpoint.next_frame().await;
    let instructions = patch["session"]["instructions"].as_str().unwrap();
    assert!(instructions.starts_with("Answer in one sentence."));
    assert!(instructions.contains("Pricing starts at $5k."));
}

#[tokio::test]
async fn test_second_start_session_replaces_the_first() {
    let mut endpoint = MockRealtimeEndpoint::start().await;
    let (addr, state) = start_server(relay_config(&endpoint.url, Some("sk-test")), None).await;
    let mut client = connect_client(addr).await;
    open_session(&mut client, &mut endpoint).await;

    send_json(
        &mut client,
        json!({"type": "start_session", "config": {"voice": "verse"}}),
    )
    .await;

    // The first socket is closed and the second one initialized
    let mut first_closed = false;
    let mut second_init = None;
    while !first_closed || second_init.is_none() {
        match endpoint.next_observation().await {
            EndpointObservation::Closed(0) => first_closed = true,
            EndpointObservation::Frame(1, frame) if second_init.is_none() => {
                second_init = Some(frame)
            }
            other => panic!("unexpected endpoint activity: {other:?}"),
        }
    }
    let init = second_init.unwrap();
    assert_eq!(init["type"], "session.update");
    assert_eq!(init["session"]["voice"], "verse");

    // No session_ended for the bridge the relay closed itself
    let started = recv_json(&mut client).await;
    assert_eq!(started["type"], "session_started");
    assert_eq!(recv_json(&mut client).await["data"]["type"], "session.created");
    assert_eq!(recv_json(&mut client).await["data"]["type"], "session.updated");
    let pending = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(pending.is_err(), "replacement produced an extra frame");

    // Only the new bridge carries traffic
    send_json(&mut client, json!({"type": "commit_audio"})).await;
    match endpoint.next_observation().await {
        EndpointObservation::Frame(1, frame) => {
            assert_eq!(frame["type"], "input_audio_buffer.commit")
        }
        other => panic!("expected commit on the new connection, got {other:?}"),
    }
    assert_eq!(state.hub.len(), 1);
}

#[tokio::test]
async fn test_endpoint_close_ends_session() {
    let mut endpoint = MockRealtimeEndpoint::start().await;
    let (addr, state) = start_server(relay_config(&endpoint.url, Some("sk-test")), None).await;
    let mut client = connect_client(addr).await;
    open_session(&mut client, &mut endpoint).await;

    endpoint.close_with(4001, "bad key");

    let error = recv_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "upstream_error");

    let ended = recv_json(&mut client).await;
    assert_eq!(ended["type"], "session_ended");
    assert_eq!(ended["reason"], "4001: invalid API key");

    // The client connection stays open without a session
    assert_eq!(state.hub.len(), 1);
    send_json(&mut client, json!({"type": "commit_audio"})).await;
    let pending = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(pending.is_err(), "commit without a session produces no reply");
}

#[tokio::test]
async fn test_start_session_without_api_key() {
    let (addr, _state) = start_server(relay_config("ws://127.0.0.1:9/v1/realtime", None), None).await;
    let mut client = connect_client(addr).await;

    send_json(&mut client, json!({"type": "start_session"})).await;

    let error = recv_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "missing_api_key");
    assert_eq!(
        error["message"],
        "OpenAI API key not configured in server environment"
    );
}

#[tokio::test]
async fn test_start_session_with_unreachable_endpoint() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (addr, _state) = start_server(
        relay_config(&format!("ws://127.0.0.1:{port}/v1/realtime"), Some("sk-test")),
        None,
    )
    .await;
    let mut client = connect_client(addr).await;

    send_json(&mut client, json!({"type": "start_session", "config": {}})).await;

    let error = recv_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "connection_error");
}

#[tokio::test]
async fn test_oversized_instructions_are_rejected() {
    let (addr, _state) = start_server(relay_config("ws://127.0.0.1:9/v1/realtime", None), None).await;
    let mut client = connect_client(addr).await;

    let huge = "x".repeat(100 * 1024 + 1);
    send_json(
        &mut client,
        json!({"type": "start_session", "config": {"instructions": huge}}),
    )
    .await;

    let error = recv_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "validation_error");
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let (addr, state) = start_server(relay_config("ws://127.0.0.1:9/v1/realtime", None), None).await;
    let mut client = connect_client(addr).await;

    client
        .send(Message::Text("not json".into()))
        .await
        .unwrap();
    send_json(&mut client, json!({"type": "no_such_message"})).await;
    send_json(&mut client, json!({"type": "start_session"})).await;

    // Still served: the missing key error proves the loop kept running
    let error = recv_json(&mut client).await;
    assert_eq!(error["code"], "missing_api_key");
    assert_eq!(state.hub.len(), 1);
}
