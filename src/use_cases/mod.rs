// Use cases layer: session workflows over the synchronization domain.

pub mod session;
pub mod state_engine;
pub mod types;
pub mod world;

#[cfg(test)]
pub(crate) mod test_support;

pub use session::{GameSession, SessionSettings};
pub use state_engine::StateEngine;
pub use types::{
    ChatMessage, ConnectIdentity, ConnectionState, InboundMessage, SyncEvent, TransportCommand,
    TransportEvent,
};
pub use world::{EntityCallback, WorldCoordinator};
