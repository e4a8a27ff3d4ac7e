// Use-case level inputs/outputs: transport traffic in, collaborator notifications out.

use crate::domain::{EntityState, OutboundMessage, PlayerState, RoomState};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub player_id: String,
    pub username: String,
    pub text: String,
    pub timestamp: u64,
}

// Inbound server traffic after decoding and validation.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    ConnectAck { player_id: Option<String> },
    PlayerJoin(PlayerState),
    PlayerLeave { player_id: String, room_id: Option<String> },
    PlayerMove(PlayerState),
    RoomJoin { room_id: String, name: Option<String> },
    RoomState(RoomState),
    Chat(ChatMessage),
    Error { message: String, code: Option<String> },
    Heartbeat { timestamp: u64 },
}

// Identity presented to the server on every successful open.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectIdentity {
    pub player_id: String,
    pub username: String,
    pub auth_data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Connect(ConnectIdentity),
    Send(OutboundMessage),
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    // `clean` is true only for an explicit disconnect.
    Disconnected { clean: bool },
    // `attempt` counts from 1.
    ReconnectScheduled { attempt: u32, delay: Duration },
    ReconnectFailed,
    Error(String),
    Message(InboundMessage),
}

// Notifications for render/UI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    ReconnectFailed,
    Error(String),
    PlayerJoined(String),
    PlayerLeft(String),
    RoomJoined(String),
    RoomLeft(String),
    RoomChanged {
        previous: Option<String>,
        current: String,
    },
    EntityAdded {
        room_id: String,
        entity: EntityState,
    },
    EntityRemoved {
        room_id: String,
        entity_id: String,
    },
    ChatReceived(ChatMessage),
}
