// Network adapter modules split by the socket task and its outbound queue.

pub mod outbox;
pub mod transport;

pub use transport::{TransportConfig, TransportError, TransportHandle, spawn_transport};
