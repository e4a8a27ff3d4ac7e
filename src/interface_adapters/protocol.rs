// Wire protocol DTOs and conversions for the player sync WebSocket.
// Envelopes are `{"type": "<kebab-case>", "data": {...}}` with camelCase payload fields.

use crate::domain::{
    Direction, EntityState, Health, Input, OutboundMessage, PlayerState, Position, RoomState,
};
use crate::use_cases::{ChatMessage, ConnectIdentity, InboundMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_SPEED: f32 = 150.0;

// Every `type` tag the server is expected to send; anything else is unknown rather than malformed.
const SERVER_MESSAGE_TYPES: &[&str] = &[
    "connect",
    "player-join",
    "player-leave",
    "player-move",
    "room-join",
    "room-state",
    "chat-message",
    "error",
    "heartbeat",
];

#[derive(Debug)]
pub enum ProtocolError {
    // Categorizes inbound decode failures so the transport can decide how loudly to log.
    Malformed(serde_json::Error),
    UnknownType(String),
    InvalidPayload(&'static str),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Malformed(err) => write!(f, "malformed message: {err}"),
            ProtocolError::UnknownType(kind) => write!(f, "unknown message type: {kind}"),
            ProtocolError::InvalidPayload(reason) => write!(f, "invalid payload: {reason}"),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Malformed(e)
    }
}

/// Messages the server sends to this client over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    // Acknowledges the auth message sent on open; `data` may be absent or null.
    Connect(Option<ConnectAckDto>),
    PlayerJoin(PlayerStateDto),
    PlayerLeave(PlayerLeaveDto),
    PlayerMove(PlayerStateDto),
    // Join acknowledgment; may name a different room than requested.
    RoomJoin(RoomJoinDto),
    // Full authoritative snapshot of one room.
    RoomState(RoomStateDto),
    ChatMessage(ChatMessageDto),
    Error(ErrorDto),
    Heartbeat(Option<HeartbeatDto>),
}

/// Messages this client sends to the server over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    // Authentication sent on every successful open.
    Connect(AuthPayload),
    PlayerInput(PlayerInputDto),
    PlayerMove(PlayerStateDto),
    RoomJoin(RoomMembershipDto),
    RoomLeave(RoomMembershipDto),
    ChatMessage(ChatMessageDto),
    Heartbeat(HeartbeatDto),
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub player_id: String,
    pub username: String,
    pub timestamp: u64,
    #[serde(flatten)]
    pub auth_data: HashMap<String, serde_json::Value>,
}

impl AuthPayload {
    pub fn new(identity: &ConnectIdentity, timestamp: u64) -> Self {
        Self {
            player_id: identity.player_id.clone(),
            username: identity.username.clone(),
            timestamp,
            auth_data: identity.auth_data.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAckDto {
    #[serde(default)]
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionDto {
    pub x: f32,
    pub y: f32,
}

impl From<Position> for PositionDto {
    fn from(p: Position) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<PositionDto> for Position {
    fn from(p: PositionDto) -> Self {
        Position::new(p.x, p.y)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionDto {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl From<Direction> for DirectionDto {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Up => DirectionDto::Up,
            Direction::Down => DirectionDto::Down,
            Direction::Left => DirectionDto::Left,
            Direction::Right => DirectionDto::Right,
        }
    }
}

impl From<DirectionDto> for Direction {
    fn from(d: DirectionDto) -> Self {
        match d {
            DirectionDto::Up => Direction::Up,
            DirectionDto::Down => Direction::Down,
            DirectionDto::Left => Direction::Left,
            DirectionDto::Right => Direction::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub current: f32,
    pub max: f32,
    #[serde(default)]
    pub regen_rate: f32,
}

impl Default for HealthDto {
    fn default() -> Self {
        Health::default().into()
    }
}

impl From<Health> for HealthDto {
    fn from(h: Health) -> Self {
        Self {
            current: h.current,
            max: h.max,
            regen_rate: h.regen_rate,
        }
    }
}

fn default_speed() -> f32 {
    DEFAULT_SPEED
}

/// Authoritative player shape; only `id` and `position` are required inbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateDto {
    pub id: String,
    pub position: PositionDto,
    #[serde(default)]
    pub direction: DirectionDto,
    #[serde(default)]
    pub animation: String,
    #[serde(default)]
    pub health: HealthDto,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub last_updated: u64,
    #[serde(default)]
    pub is_moving: bool,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

impl From<&PlayerState> for PlayerStateDto {
    fn from(p: &PlayerState) -> Self {
        Self {
            id: p.id.clone(),
            position: p.position.into(),
            direction: p.direction.into(),
            animation: p.animation.clone(),
            health: p.health.into(),
            username: p.username.clone(),
            room_id: p.room_id.clone(),
            last_updated: p.last_updated,
            is_moving: p.is_moving,
            speed: p.speed,
        }
    }
}

impl TryFrom<PlayerStateDto> for PlayerState {
    type Error = ProtocolError;

    fn try_from(dto: PlayerStateDto) -> Result<Self, Self::Error> {
        if dto.id.is_empty() {
            return Err(ProtocolError::InvalidPayload("player id is empty"));
        }
        let position = Position::from(dto.position);
        if !position.is_finite() {
            return Err(ProtocolError::InvalidPayload("player position is not finite"));
        }
        if !dto.speed.is_finite() || dto.speed < 0.0 {
            return Err(ProtocolError::InvalidPayload("player speed is not a valid scalar"));
        }
        if !dto.health.current.is_finite() || !dto.health.max.is_finite() {
            return Err(ProtocolError::InvalidPayload("player health is not finite"));
        }

        let direction = Direction::from(dto.direction);
        let animation = if dto.animation.is_empty() {
            crate::domain::state::animation_key(direction, dto.is_moving)
        } else {
            dto.animation
        };

        Ok(PlayerState {
            id: dto.id,
            position,
            direction,
            animation,
            health: Health {
                current: dto.health.current,
                max: dto.health.max,
                regen_rate: dto.health.regen_rate,
            },
            username: dto.username,
            room_id: dto.room_id,
            last_updated: dto.last_updated,
            is_moving: dto.is_moving,
            speed: dto.speed,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStateDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub position: PositionDto,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl TryFrom<EntityStateDto> for EntityState {
    type Error = ProtocolError;

    fn try_from(dto: EntityStateDto) -> Result<Self, Self::Error> {
        let position = Position::from(dto.position);
        if !position.is_finite() {
            return Err(ProtocolError::InvalidPayload("entity position is not finite"));
        }
        Ok(EntityState {
            id: dto.id,
            kind: dto.kind,
            position,
            properties: dto.properties,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeaveDto {
    pub player_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinDto {
    pub room_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMembershipDto {
    pub room_id: String,
    pub player_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateDto {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub players: HashMap<String, PlayerStateDto>,
    #[serde(default)]
    pub entities: HashMap<String, EntityStateDto>,
    #[serde(default)]
    pub last_updated: u64,
}

impl TryFrom<RoomStateDto> for RoomState {
    type Error = ProtocolError;

    fn try_from(dto: RoomStateDto) -> Result<Self, Self::Error> {
        if dto.id.is_empty() {
            return Err(ProtocolError::InvalidPayload("room id is empty"));
        }
        // Map keys are authoritative; payload ids are overwritten to match.
        let players = dto
            .players
            .into_iter()
            .map(|(id, mut player)| {
                player.id = id.clone();
                PlayerState::try_from(player).map(|p| (id, p))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        let entities = dto
            .entities
            .into_iter()
            .map(|(id, mut entity)| {
                entity.id = id.clone();
                EntityState::try_from(entity).map(|e| (id, e))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        // An empty name leaves any cached name in place.
        Ok(RoomState {
            id: dto.id,
            name: dto.name,
            players,
            entities,
            last_updated: dto.last_updated,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    pub player_id: String,
    #[serde(default)]
    pub username: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: u64,
}

impl From<ChatMessageDto> for ChatMessage {
    fn from(dto: ChatMessageDto) -> Self {
        Self {
            player_id: dto.player_id,
            username: dto.username,
            text: dto.message,
            timestamp: dto.timestamp,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDto {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatDto {
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDto {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub action: bool,
    pub timestamp: u64,
}

impl From<Input> for InputDto {
    fn from(i: Input) -> Self {
        Self {
            up: i.up,
            down: i.down,
            left: i.left,
            right: i.right,
            action: i.action,
            timestamp: i.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInputDto {
    pub player_id: String,
    pub input: InputDto,
    pub position: PositionDto,
}

impl From<OutboundMessage> for ClientMessage {
    fn from(message: OutboundMessage) -> Self {
        match message {
            OutboundMessage::Input {
                player_id,
                input,
                position,
            } => ClientMessage::PlayerInput(PlayerInputDto {
                player_id,
                input: input.into(),
                position: position.into(),
            }),
            OutboundMessage::Move(player) => ClientMessage::PlayerMove((&player).into()),
            OutboundMessage::JoinRoom { room_id, player_id } => {
                ClientMessage::RoomJoin(RoomMembershipDto { room_id, player_id })
            }
            OutboundMessage::LeaveRoom { room_id, player_id } => {
                ClientMessage::RoomLeave(RoomMembershipDto { room_id, player_id })
            }
            OutboundMessage::Chat {
                player_id,
                username,
                text,
                timestamp,
            } => ClientMessage::ChatMessage(ChatMessageDto {
                player_id,
                username,
                message: text,
                timestamp,
            }),
        }
    }
}

impl TryFrom<ServerMessage> for InboundMessage {
    type Error = ProtocolError;

    fn try_from(message: ServerMessage) -> Result<Self, ProtocolError> {
        Ok(match message {
            ServerMessage::Connect(ack) => InboundMessage::ConnectAck {
                player_id: ack.and_then(|ack| ack.player_id),
            },
            ServerMessage::PlayerJoin(player) => InboundMessage::PlayerJoin(player.try_into()?),
            ServerMessage::PlayerLeave(leave) => InboundMessage::PlayerLeave {
                player_id: leave.player_id,
                room_id: leave.room_id,
            },
            ServerMessage::PlayerMove(player) => InboundMessage::PlayerMove(player.try_into()?),
            ServerMessage::RoomJoin(join) => InboundMessage::RoomJoin {
                room_id: join.room_id,
                name: join.name,
            },
            ServerMessage::RoomState(room) => InboundMessage::RoomState(room.try_into()?),
            ServerMessage::ChatMessage(chat) => InboundMessage::Chat(chat.into()),
            ServerMessage::Error(err) => InboundMessage::Error {
                message: err.message,
                code: err.code,
            },
            ServerMessage::Heartbeat(beat) => InboundMessage::Heartbeat {
                timestamp: beat.map_or(0, |beat| beat.timestamp),
            },
        })
    }
}

/// Decodes and validates one inbound text frame.
pub fn decode_server_message(text: &str) -> Result<InboundMessage, ProtocolError> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => InboundMessage::try_from(message),
        Err(parse_err) => match serde_json::from_str::<RawEnvelope>(text) {
            Ok(raw) if !SERVER_MESSAGE_TYPES.contains(&raw.kind.as_str()) => {
                Err(ProtocolError::UnknownType(raw.kind))
            }
            _ => Err(ProtocolError::Malformed(parse_err)),
        },
    }
}

pub fn encode_client_message(message: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
