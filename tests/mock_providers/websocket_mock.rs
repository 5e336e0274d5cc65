//! WebSocket mock of the realtime voice endpoint.
//!
//! Accepts any number of connections, records every text frame it receives
//! tagged with the connection it came from, answers the first
//! `session.update` of each connection with `session.created` and
//! `session.updated`, and lets the test push frames to the latest connection
//! or close it with a code.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Instruction for the mock endpoint.
#[derive(Debug)]
pub enum EndpointCommand {
    Send(Value),
    Close(u16, String),
}

/// What the mock observed on its side of a connection. The index counts
/// accepted connections from zero.
#[derive(Debug)]
pub enum EndpointObservation {
    Frame(usize, Value),
    Closed(usize),
}

pub struct MockRealtimeEndpoint {
    pub url: String,
    observed: mpsc::UnboundedReceiver<EndpointObservation>,
    commands: Arc<Mutex<Option<mpsc::UnboundedSender<EndpointCommand>>>>,
}

impl MockRealtimeEndpoint {
    /// Start the mock on a random local port. Commands go to the most
    /// recently accepted connection.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (observed_tx, observed) = mpsc::unbounded_channel();
        let commands = Arc::new(Mutex::new(None));

        let latest = commands.clone();
        tokio::spawn(async move {
            let mut index = 0;
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (command_tx, command_rx) = mpsc::unbounded_channel();
                *latest.lock() = Some(command_tx);
                tokio::spawn(serve(index, ws, observed_tx.clone(), command_rx));
                index += 1;
            }
        });

        Self {
            url: format!("ws://{addr}/v1/realtime"),
            observed,
            commands,
        }
    }

    fn command(&self, command: EndpointCommand) {
        self.commands
            .lock()
            .as_ref()
            .expect("no connection accepted yet")
            .send(command)
            .unwrap();
    }

    pub fn send(&self, frame: Value) {
        self.command(EndpointCommand::Send(frame));
    }

    pub fn close_with(&self, code: u16, reason: &str) {
        self.command(EndpointCommand::Close(code, reason.to_string()));
    }

    /// Next frame received from the relay; panics on timeout or close.
    pub async fn next_frame(&mut self) -> Value {
        match tokio::time::timeout(Duration::from_secs(5), self.observed.recv()).await {
            Ok(Some(EndpointObservation::Frame(_, frame))) => frame,
            other => panic!("expected a frame from the relay, got {other:?}"),
        }
    }

    /// Next observation on any connection; panics on timeout.
    pub async fn next_observation(&mut self) -> EndpointObservation {
        match tokio::time::timeout(Duration::from_secs(5), self.observed.recv()).await {
            Ok(Some(observation)) => observation,
            other => panic!("expected activity from the relay, got {other:?}"),
        }
    }

    /// Whether nothing arrives within `wait`.
    pub async fn stays_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.observed.recv()).await.is_err()
    }

    /// Wait until the relay closes its side of the connection.
    pub async fn wait_closed(&mut self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, self.observed.recv()).await {
                Ok(Some(EndpointObservation::Closed(_))) | Ok(None) => return,
                Ok(Some(EndpointObservation::Frame(..))) => continue,
                Err(_) => panic!("relay did not close the endpoint connection"),
            }
        }
    }
}

/// Serve one accepted connection until either side closes it.
async fn serve(
    index: usize,
    ws: WebSocketStream<TcpStream>,
    observed_tx: mpsc::UnboundedSender<EndpointObservation>,
    mut command_rx: mpsc::UnboundedReceiver<EndpointCommand>,
) {
    let (mut write, mut read) = ws.split();
    let mut acknowledged = false;

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                    let is_update = frame["type"] == "session.update";
                    let _ = observed_tx.send(EndpointObservation::Frame(index, frame));
                    if is_update && !acknowledged {
                        acknowledged = true;
                        for reply in [
                            json!({"type": "session.created", "session": {"id": "sess_mock"}}),
                            json!({"type": "session.updated", "session": {"id": "sess_mock"}}),
                        ] {
                            let _ = write.send(Message::Text(reply.to_string().into())).await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                    let _ = observed_tx.send(EndpointObservation::Closed(index));
                    break;
                }
                Some(Ok(_)) => {}
            },
            Some(command) = command_rx.recv() => match command {
                EndpointCommand::Send(frame) => {
                    let _ = write.send(Message::Text(frame.to_string().into())).await;
                }
                EndpointCommand::Close(code, reason) => {
                    let _ = write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })))
                        .await;
                }
            },
        }
    }
}
