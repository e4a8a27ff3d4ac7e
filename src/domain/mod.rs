// Domain layer: synchronization state types and per-tick rules.

pub mod backoff;
pub mod ports;
pub mod state;
pub mod systems;
pub mod tuning;

pub use backoff::{BackoffState, ReconnectPolicy, RetryDecision};
pub use ports::{AvatarHandle, Clock, MessageOutbox, OutboundMessage, TransportControl};
pub use state::{
    Direction, EntityState, Health, Input, LocalPlayerState, PendingUpdate, PlayerState, Position,
    RemotePlayerState, RoomState,
};
pub use tuning::SyncTuning;
