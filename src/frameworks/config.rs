use crate::domain::{ReconnectPolicy, SyncTuning};
use crate::interface_adapters::net::TransportConfig;
use crate::use_cases::SessionSettings;
use std::{env, str::FromStr, time::Duration};

// Runtime/client constants (not gameplay tuning).

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

pub fn server_url() -> String {
    env::var("SYNC_SERVER_URL").unwrap_or_else(|_| "ws://127.0.0.1:3001/ws".to_string())
}

pub fn default_room() -> Option<String> {
    match env::var("SYNC_DEFAULT_ROOM") {
        Ok(room) if room.trim().is_empty() => None,
        Ok(room) => Some(room.trim().to_string()),
        Err(_) => Some("lobby".to_string()),
    }
}

pub fn reconnect_max_attempts() -> u32 {
    env_or("SYNC_RECONNECT_MAX_ATTEMPTS", 5)
}

pub fn reconnect_base_delay() -> Duration {
    Duration::from_millis(env_or("SYNC_RECONNECT_BASE_DELAY_MS", 3000))
}

pub fn heartbeat_interval() -> Duration {
    Duration::from_millis(env_or::<u64>("SYNC_HEARTBEAT_INTERVAL_MS", 30_000).max(1))
}

pub fn connect_timeout() -> Duration {
    Duration::from_millis(env_or("SYNC_CONNECT_TIMEOUT_MS", 5000))
}

pub fn input_send_rate() -> u32 {
    env_or("SYNC_INPUT_SEND_RATE", 20)
}

pub fn interpolation_buffer() -> usize {
    env_or("SYNC_INTERPOLATION_BUFFER", 5)
}

pub fn reconcile_threshold() -> f32 {
    env_or("SYNC_RECONCILE_THRESHOLD", 50.0)
}

pub fn pending_capacity() -> usize {
    env_or("SYNC_PENDING_CAPACITY", 10)
}

// Unset keeps every room for the process lifetime.
pub fn max_cached_rooms() -> Option<usize> {
    env::var("SYNC_MAX_CACHED_ROOMS")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|max| *max > 0)
}

pub fn tick_interval() -> Duration {
    Duration::from_millis(env_or::<u64>("SYNC_TICK_MS", 16).max(1))
}

pub fn player_id() -> Option<String> {
    env::var("SYNC_PLAYER_ID").ok().filter(|id| !id.trim().is_empty())
}

pub fn username() -> String {
    env::var("SYNC_USERNAME").unwrap_or_else(|_| "Player".to_string())
}

/// Everything the client binary needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub default_room: Option<String>,
    pub reconnect: ReconnectPolicy,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub tick_interval: Duration,
    pub max_cached_rooms: Option<usize>,
    pub tuning: SyncTuning,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            server_url: transport.url,
            default_room: Some("lobby".to_string()),
            reconnect: transport.reconnect,
            heartbeat_interval: transport.heartbeat_interval,
            connect_timeout: transport.connect_timeout,
            tick_interval: Duration::from_millis(16),
            max_cached_rooms: None,
            tuning: SyncTuning::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let tuning = SyncTuning {
            pending_capacity: pending_capacity(),
            interpolation_capacity: interpolation_buffer(),
            reconciliation_threshold: reconcile_threshold(),
            input_send_rate: input_send_rate(),
            ..SyncTuning::default()
        };

        Self {
            server_url: server_url(),
            default_room: default_room(),
            reconnect: ReconnectPolicy {
                base_delay: reconnect_base_delay(),
                max_attempts: reconnect_max_attempts(),
            },
            heartbeat_interval: heartbeat_interval(),
            connect_timeout: connect_timeout(),
            tick_interval: tick_interval(),
            max_cached_rooms: max_cached_rooms(),
            tuning,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            url: self.server_url.clone(),
            reconnect: self.reconnect,
            heartbeat_interval: self.heartbeat_interval,
            connect_timeout: self.connect_timeout,
        }
    }

    pub fn session(&self) -> SessionSettings {
        SessionSettings {
            tuning: self.tuning,
            default_room: self.default_room.clone(),
            max_cached_rooms: self.max_cached_rooms,
        }
    }
}
