use crate::domain::state::{Direction, Input, PlayerState, Position};

// Outbound intents produced by the state engine; the transport owns their wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Input {
        player_id: String,
        input: Input,
        position: Position,
    },
    Move(PlayerState),
    JoinRoom {
        room_id: String,
        player_id: String,
    },
    LeaveRoom {
        room_id: String,
        player_id: String,
    },
    Chat {
        player_id: String,
        username: String,
        text: String,
        timestamp: u64,
    },
}

// Port for handing messages to the network layer; sends are fire-and-forget.
pub trait MessageOutbox: Send {
    fn send(&self, message: OutboundMessage);
}

// Port for the render-layer handle of the local player, injected instead of looked up.
pub trait AvatarHandle: Send {
    fn sync(&mut self, position: Position, direction: Direction, animation: &str);
}

// Port for lifecycle control of the connection owned by the network layer.
pub trait TransportControl: Send {
    fn disconnect(&self);
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}
