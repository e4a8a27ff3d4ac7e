// Domain-level player, room, and entity state shared by the engine and coordinator.

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_to(&self, other: Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

/// Builds the animation key for a facing and movement flag, e.g. `walk-left` or `idle-down`.
pub fn animation_key(direction: Direction, moving: bool) -> String {
    let prefix = if moving { "walk" } else { "idle" };
    format!("{prefix}-{}", direction.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health {
    pub current: f32,
    pub max: f32,
    pub regen_rate: f32,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            current: 100.0,
            max: 100.0,
            regen_rate: 0.0,
        }
    }
}

// Authoritative player shape as the server describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: String,
    pub position: Position,
    pub direction: Direction,
    pub animation: String,
    pub health: Health,
    pub username: String,
    pub room_id: String,
    // Sender-local wall clock in milliseconds.
    pub last_updated: u64,
    pub is_moving: bool,
    pub speed: f32,
}

impl PlayerState {
    pub fn new(id: impl Into<String>, username: impl Into<String>, speed: f32) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            direction: Direction::Down,
            animation: animation_key(Direction::Down, false),
            health: Health::default(),
            username: username.into(),
            room_id: String::new(),
            last_updated: 0,
            is_moving: false,
            speed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Input {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub action: bool,
    pub timestamp: u64,
}

impl Input {
    pub fn is_directional(&self) -> bool {
        self.up || self.down || self.left || self.right
    }
}

// One predicted movement tick kept around until the server catches up.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub input: Input,
    pub predicted_position: Position,
    pub server_acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlayerState {
    pub player: PlayerState,
    pub inputs: Input,
    // Oldest first; ordered by input timestamp.
    pub pending_updates: VecDeque<PendingUpdate>,
    pub inventory: Vec<String>,
    pub stats: HashMap<String, f64>,
    pub effects: Vec<String>,
}

impl LocalPlayerState {
    pub fn new(player: PlayerState) -> Self {
        Self {
            player,
            inputs: Input::default(),
            pending_updates: VecDeque::new(),
            inventory: Vec::new(),
            stats: HashMap::new(),
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayerState {
    pub player: PlayerState,
    // Targets still to be reached, oldest first.
    pub interpolation_points: VecDeque<Position>,
}

impl RemotePlayerState {
    pub fn new(player: PlayerState) -> Self {
        Self {
            player,
            interpolation_points: VecDeque::new(),
        }
    }
}

// Non-player world object (NPC, interactable) described by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub id: String,
    pub kind: String,
    pub position: Position,
    pub properties: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomState {
    pub id: String,
    pub name: String,
    pub players: HashMap<String, PlayerState>,
    pub entities: HashMap<String, EntityState>,
    pub last_updated: u64,
}

impl RoomState {
    pub fn empty(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Default::default()
        }
    }
}
