// Framework bootstrap for the headless sync client.

use crate::frameworks::config::{self, ClientConfig};
use crate::interface_adapters::net::spawn_transport;
use crate::interface_adapters::utils::clock::{SystemClock, now_millis};
use crate::use_cases::{ConnectIdentity, ConnectionState, GameSession, SyncEvent};

use std::{collections::HashMap, io::Result, time::Duration};
use tokio::time::{Instant, MissedTickBehavior};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Drives one session until Ctrl-C or until reconnecting is given up.
pub async fn run(config: ClientConfig, identity: ConnectIdentity) -> Result<()> {
    let (transport, mut transport_events) = spawn_transport(config.transport());
    let mut session = GameSession::new(
        config.session(),
        Box::new(transport.clone()),
        Box::new(transport.clone()),
        Box::new(SystemClock),
    );

    session.init_local_player(identity.player_id.clone(), identity.username.clone());
    transport.connect(identity);

    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let mut last_tick = started;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.poll(&mut transport_events);

                let now = Instant::now();
                let delta = now.duration_since(last_tick).as_secs_f32() * 1000.0;
                last_tick = now;
                session.update(now.duration_since(started).as_secs_f64() * 1000.0, delta);

                let mut gave_up = false;
                for event in session.drain_events() {
                    gave_up |= matches!(event, SyncEvent::ReconnectFailed);
                    log_event(&event);
                }
                if gave_up {
                    tracing::error!("server unreachable; stopping client");
                    break Ok(());
                }
            }
            signal = &mut ctrl_c => {
                tracing::info!("shutdown requested");
                break signal;
            }
        }
    };

    session.shutdown();
    let mut state = transport.subscribe_state();
    let closed = tokio::time::timeout(
        SHUTDOWN_GRACE,
        state.wait_for(|state| *state == ConnectionState::Disconnected),
    )
    .await;
    if closed.is_err() {
        tracing::warn!("transport did not close within grace period");
    }

    outcome
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let config = ClientConfig::from_env();
    let identity = ConnectIdentity {
        player_id: config::player_id().unwrap_or_else(|| format!("player-{}", now_millis())),
        username: config::username(),
        auth_data: HashMap::new(),
    };
    tracing::debug!(
        server_url = %config.server_url,
        default_room = ?config.default_room,
        tick_ms = config.tick_interval.as_millis() as u64,
        "client configured"
    );

    run(config, identity).await.inspect_err(|e| {
        tracing::error!(error = %e, "client error");
    })
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::Connected => tracing::info!("connected to server"),
        SyncEvent::Disconnected => tracing::info!("disconnected from server"),
        SyncEvent::ReconnectFailed => tracing::error!("reconnect failed"),
        SyncEvent::Error(message) => tracing::warn!(error = %message, "sync error"),
        SyncEvent::PlayerJoined(id) => tracing::info!(player_id = %id, "player joined"),
        SyncEvent::PlayerLeft(id) => tracing::info!(player_id = %id, "player left"),
        SyncEvent::RoomJoined(id) => tracing::info!(room_id = %id, "room joined"),
        SyncEvent::RoomLeft(id) => tracing::info!(room_id = %id, "room left"),
        SyncEvent::RoomChanged { previous, current } => {
            tracing::info!(previous = ?previous, room_id = %current, "room changed");
        }
        SyncEvent::EntityAdded { room_id, entity } => {
            tracing::debug!(room_id = %room_id, entity_id = %entity.id, kind = %entity.kind, "entity added");
        }
        SyncEvent::EntityRemoved { room_id, entity_id } => {
            tracing::debug!(room_id = %room_id, entity_id = %entity_id, "entity removed");
        }
        SyncEvent::ChatReceived(chat) => {
            tracing::info!(player_id = %chat.player_id, username = %chat.username, text = %chat.text, "chat");
        }
    }
}
