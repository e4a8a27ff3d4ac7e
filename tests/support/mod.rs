// Shared mock WebSocket server and event helpers for integration tests.
#![allow(dead_code)]

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use player_sync::TransportConfig;
use player_sync::domain::ReconnectPolicy;
use player_sync::use_cases::TransportEvent;
use serde_json::Value;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::{broadcast, mpsc};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    DropAll,
}

struct Shared {
    // Every text frame received from any client, parsed as JSON, in arrival order.
    frames: Mutex<Vec<Value>>,
    connections: AtomicUsize,
    control: broadcast::Sender<Control>,
}

/// Axum WebSocket server on an ephemeral port that records client frames.
pub struct MockServer {
    url: String,
    shared: Arc<Shared>,
}

impl MockServer {
    pub async fn start() -> Self {
        let (control, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            frames: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            control,
        });

        // Bind to an ephemeral port to avoid collisions with local services.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral test port");
        let addr = listener.local_addr().expect("get local addr");
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(Arc::clone(&shared));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server failed");
        });

        Self {
            url: format!("ws://{addr}/ws"),
            shared,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn frames(&self) -> Vec<Value> {
        self.shared.frames.lock().expect("frames mutex").clone()
    }

    pub fn frames_of_type(&self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|frame| frame["type"] == kind)
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Sends a raw text frame to every connected client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.shared.control.send(Control::Push(text.into()));
    }

    pub fn push(&self, frame: Value) {
        self.push_text(frame.to_string());
    }

    /// Drops every open socket without a close handshake.
    pub fn drop_connections(&self) {
        let _ = self.shared.control.send(Control::DropAll);
    }

    pub async fn wait_for_frames(&self, kind: &str, count: usize) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let frames = self.frames_of_type(kind);
            if frames.len() >= count {
                return frames;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("expected {count} `{kind}` frames, saw {}", frames.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(shared): State<Arc<Shared>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, shared))
}

async fn handle_socket(mut socket: WebSocket, shared: Arc<Shared>) {
    // Subscribe before anything else so pushes after the auth frame are never missed.
    let mut control = shared.control.subscribe();
    shared.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                        shared.frames.lock().expect("frames mutex").push(value);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            command = control.recv() => match command {
                Ok(Control::Push(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Control::DropAll) | Err(_) => return,
            },
        }
    }
}

/// Transport config with short timers so reconnect paths finish quickly.
pub fn fast_config(url: &str) -> TransportConfig {
    TransportConfig {
        url: url.to_string(),
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(20),
            max_attempts: 3,
        },
        heartbeat_interval: Duration::from_secs(30),
        connect_timeout: Duration::from_secs(2),
    }
}

/// Returns a ws:// URL on which nothing is listening.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{addr}/ws")
}

/// Waits for the first event matching `predicate`, collecting everything seen on the way.
pub async fn wait_for_event<F>(
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    mut predicate: F,
) -> Vec<TransportEvent>
where
    F: FnMut(&TransportEvent) -> bool,
{
    let mut seen = Vec::new();
    let result = tokio::time::timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            let done = predicate(&event);
            seen.push(event);
            if done {
                return true;
            }
        }
        false
    })
    .await;
    assert!(
        matches!(result, Ok(true)),
        "event not observed in time; saw {seen:?}"
    );
    seen
}
