// Client WebSocket transport: one task owns the socket, retries with backoff, and heartbeats.

use crate::domain::{
    BackoffState, MessageOutbox, OutboundMessage, ReconnectPolicy, RetryDecision, TransportControl,
};
use crate::interface_adapters::net::outbox::{FrameSink, Outbox};
use crate::interface_adapters::protocol::{
    AuthPayload, ClientMessage, HeartbeatDto, ProtocolError, decode_server_message,
    encode_client_message,
};
use crate::interface_adapters::utils::clock::now_millis;
use crate::use_cases::{ConnectIdentity, ConnectionState, TransportCommand, TransportEvent};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, debug, error, info, info_span, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const LOG_THROTTLE: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum TransportError {
    // Categorizes socket failures so the task can decide between retry and shutdown.
    Ws(tokio_tungstenite::tungstenite::Error),
    Serialization(serde_json::Error),
    Timeout,
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Ws(e) => write!(f, "websocket error: {e}"),
            TransportError::Serialization(e) => write!(f, "serialization error: {e}"),
            TransportError::Timeout => write!(f, "connect timed out"),
            TransportError::Closed => write!(f, "connection closed"),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Ws(e)
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Serialization(e)
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub reconnect: ReconnectPolicy,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3001/ws".to_string(),
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Cloneable front door to the transport task; every call is fire-and-forget.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<TransportCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl TransportHandle {
    pub fn connect(&self, identity: ConnectIdentity) {
        self.command(TransportCommand::Connect(identity));
    }

    pub fn send(&self, message: OutboundMessage) {
        self.command(TransportCommand::Send(message));
    }

    pub fn disconnect(&self) {
        self.command(TransportCommand::Disconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every connection state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn command(&self, command: TransportCommand) {
        if self.commands.send(command).is_err() {
            debug!("transport task has exited; command dropped");
        }
    }
}

impl MessageOutbox for TransportHandle {
    fn send(&self, message: OutboundMessage) {
        TransportHandle::send(self, message);
    }
}

impl TransportControl for TransportHandle {
    fn disconnect(&self) {
        TransportHandle::disconnect(self);
    }
}

/// Spawns the transport task on the current runtime.
pub fn spawn_transport(
    config: TransportConfig,
) -> (TransportHandle, mpsc::UnboundedReceiver<TransportEvent>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let span = info_span!("transport", url = %config.url);
    let task = TransportTask {
        backoff: BackoffState::new(config.reconnect),
        config,
        commands: command_rx,
        events: event_tx,
        state: state_tx,
        identity: None,
        outbox: Outbox::new(),
        retry_at: None,
        last_invalid_log: Instant::now() - LOG_THROTTLE,
    };
    tokio::spawn(task.run().instrument(span));

    (
        TransportHandle {
            commands: command_tx,
            state: state_rx,
        },
        event_rx,
    )
}

// How a connected session ended.
enum SessionEnd {
    // Explicit disconnect; never reconnects.
    Clean,
    // Socket failure or remote close; reconnects with backoff.
    Dropped,
    // Every handle was dropped; the task exits.
    Shutdown,
}

struct TransportTask {
    config: TransportConfig,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: watch::Sender<ConnectionState>,
    identity: Option<ConnectIdentity>,
    outbox: Outbox,
    backoff: BackoffState,
    // Pending reconnect deadline; None while idle or connected.
    retry_at: Option<Instant>,
    last_invalid_log: Instant,
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl TransportTask {
    async fn run(mut self) {
        loop {
            let retry_at = self.retry_at;
            let end = tokio::select! {
                command = self.commands.recv() => match command {
                    None => break,
                    Some(TransportCommand::Connect(identity)) => {
                        self.identity = Some(identity);
                        self.backoff.reset();
                        self.retry_at = None;
                        self.open().await
                    }
                    Some(TransportCommand::Send(message)) => {
                        self.outbox.push(message.into());
                        continue;
                    }
                    Some(TransportCommand::Disconnect) => {
                        self.cancel_retry();
                        continue;
                    }
                },
                _ = wait_until(retry_at) => {
                    self.retry_at = None;
                    self.open().await
                }
            };

            match end {
                Some(SessionEnd::Clean) => {
                    self.set_state(ConnectionState::Disconnected);
                    info!("disconnected");
                    self.emit(TransportEvent::Disconnected { clean: true });
                }
                Some(SessionEnd::Dropped) => {
                    self.emit(TransportEvent::Disconnected { clean: false });
                    self.schedule_retry();
                }
                Some(SessionEnd::Shutdown) => break,
                // The socket never opened; the retry is already scheduled.
                None => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("transport task exiting");
    }

    // Returns None when the socket could not be opened.
    async fn open(&mut self) -> Option<SessionEnd> {
        let Some(identity) = self.identity.clone() else {
            warn!("connect attempted without an identity");
            return None;
        };

        self.set_state(ConnectionState::Connecting);
        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async(self.config.url.as_str()),
        )
        .await;
        let stream = match connect {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                self.connect_failed(TransportError::Ws(e));
                return None;
            }
            Err(_) => {
                self.connect_failed(TransportError::Timeout);
                return None;
            }
        };

        let (mut sink, source) = stream.split();
        self.backoff.reset();
        self.set_state(ConnectionState::Connected);

        let auth = ClientMessage::Connect(AuthPayload::new(&identity, now_millis()));
        if let Err(e) = send_client(&mut sink, &auth).await {
            warn!(error = %e, "failed to send auth message");
            return Some(SessionEnd::Dropped);
        }
        info!(player_id = %identity.player_id, "connected");
        self.emit(TransportEvent::Connected);

        match self.outbox.flush(&mut sink).await {
            Ok(0) => {}
            Ok(sent) => debug!(sent, "flushed queued messages"),
            Err(e) => {
                warn!(error = %e, queued = self.outbox.len(), "flush failed");
                return Some(SessionEnd::Dropped);
            }
        }

        Some(self.serve(sink, source, &identity.player_id).await)
    }

    async fn serve(&mut self, mut sink: WsSink, mut source: WsSource, player_id: &str) -> SessionEnd {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None => {
                        close_quietly(&mut sink).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(TransportCommand::Disconnect) => {
                        close_quietly(&mut sink).await;
                        return SessionEnd::Clean;
                    }
                    Some(TransportCommand::Connect(identity)) => {
                        // Takes effect on the next open.
                        debug!(player_id = %identity.player_id, "already connected; identity updated");
                        self.identity = Some(identity);
                    }
                    Some(TransportCommand::Send(message)) => {
                        self.outbox.push(message.into());
                        if let Err(e) = self.outbox.flush(&mut sink).await {
                            warn!(error = %e, queued = self.outbox.len(), "send failed");
                            return SessionEnd::Dropped;
                        }
                    }
                },

                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "server closed connection");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if should_log(&mut self.last_invalid_log) {
                            warn!(bytes = bytes.len(), "binary frame ignored");
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket recv error");
                        self.emit(TransportEvent::Error(TransportError::Ws(e).to_string()));
                        return SessionEnd::Dropped;
                    }
                    None => {
                        info!("websocket stream ended");
                        return SessionEnd::Dropped;
                    }
                },

                _ = heartbeat.tick() => {
                    let beat = ClientMessage::Heartbeat(HeartbeatDto {
                        timestamp: now_millis(),
                        player_id: Some(player_id.to_string()),
                    });
                    if let Err(e) = send_client(&mut sink, &beat).await {
                        warn!(error = %e, "heartbeat send failed");
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match decode_server_message(text) {
            Ok(message) => self.emit(TransportEvent::Message(message)),
            Err(ProtocolError::UnknownType(kind)) => {
                if should_log(&mut self.last_invalid_log) {
                    warn!(kind = %kind, "unknown message type; dropping");
                }
            }
            Err(e) => {
                if should_log(&mut self.last_invalid_log) {
                    warn!(bytes = text.len(), error = %e, "failed to parse server message");
                }
            }
        }
    }

    fn connect_failed(&mut self, err: TransportError) {
        warn!(error = %err, "failed to open websocket");
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        match self.backoff.on_failure() {
            RetryDecision::RetryAfter { attempt, delay } => {
                self.set_state(ConnectionState::Reconnecting);
                self.retry_at = Some(Instant::now() + delay);
                info!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.emit(TransportEvent::ReconnectScheduled { attempt: attempt + 1, delay });
            }
            RetryDecision::GiveUp => {
                self.set_state(ConnectionState::Disconnected);
                error!("reconnect attempts exhausted; giving up");
                self.emit(TransportEvent::ReconnectFailed);
            }
            RetryDecision::Exhausted => {
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn cancel_retry(&mut self) {
        let was_waiting = self.retry_at.take().is_some();
        self.set_state(ConnectionState::Disconnected);
        if was_waiting {
            info!("pending reconnect cancelled");
            self.emit(TransportEvent::Disconnected { clean: true });
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: TransportEvent) {
        // The session may already be gone during shutdown.
        let _ = self.events.send(event);
    }
}

async fn send_client(sink: &mut WsSink, message: &ClientMessage) -> Result<(), TransportError> {
    let text = encode_client_message(message)?;
    sink.send_text(text).await
}

async fn close_quietly(sink: &mut WsSink) {
    let _ = sink.send(Message::Close(None)).await;
    if let Err(e) = sink.close().await {
        debug!(error = %e, "socket close error");
    }
}
