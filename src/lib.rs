pub mod domain;
pub mod frameworks;
pub mod interface_adapters;
pub mod use_cases;

pub use frameworks::client::{run, run_with_config};
pub use frameworks::config::ClientConfig;
pub use interface_adapters::net::{TransportConfig, TransportHandle, spawn_transport};
pub use use_cases::{GameSession, SessionSettings, SyncEvent};
