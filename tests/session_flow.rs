mod support;

use player_sync::domain::{Input, Position};
use player_sync::interface_adapters::utils::clock::SystemClock;
use player_sync::use_cases::{ConnectIdentity, GameSession, SessionSettings, SyncEvent};
use player_sync::{TransportHandle, spawn_transport};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use support::{MockServer, WAIT, fast_config};
use tokio::sync::mpsc;

struct Client {
    session: GameSession,
    transport: TransportHandle,
    events: mpsc::UnboundedReceiver<player_sync::use_cases::TransportEvent>,
    time: f64,
    seen: Vec<SyncEvent>,
}

impl Client {
    fn start(server: &MockServer, player_id: &str) -> Self {
        let (transport, events) = spawn_transport(fast_config(server.url()));
        let settings = SessionSettings {
            default_room: Some("lobby".to_string()),
            ..Default::default()
        };
        let mut session = GameSession::new(
            settings,
            Box::new(transport.clone()),
            Box::new(transport.clone()),
            Box::new(SystemClock),
        );
        session.init_local_player(player_id, "Hero");
        transport.connect(ConnectIdentity {
            player_id: player_id.to_string(),
            username: "Hero".to_string(),
            auth_data: HashMap::new(),
        });
        Self {
            session,
            transport,
            events,
            time: 0.0,
            seen: Vec::new(),
        }
    }

    fn tick(&mut self) {
        self.session.poll(&mut self.events);
        self.session.update(self.time, 16.0);
        self.time += 16.0;
        let drained = self.session.drain_events();
        self.seen.extend(drained);
    }

    // Inputs are only forwarded from `update`, so keep ticking while waiting.
    async fn tick_until_frame(&mut self, server: &MockServer, kind: &str) -> Vec<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let frames = server.frames_of_type(kind);
            if !frames.is_empty() {
                return frames;
            }
            assert!(tokio::time::Instant::now() < deadline, "no `{kind}` frame");
            self.tick();
            tokio::time::sleep(Duration::from_millis(16)).await;
        }
    }

    // Runs 16ms ticks until an event matching `predicate` shows up.
    async fn tick_until<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&SyncEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            self.session.poll(&mut self.events);
            self.session.update(self.time, 16.0);
            self.time += 16.0;
            let drained = self.session.drain_events();
            let found = drained.iter().any(&mut predicate);
            self.seen.extend(drained);
            if found {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "event not observed; saw {:?}",
                self.seen
            );
            tokio::time::sleep(Duration::from_millis(16)).await;
        }
    }
}

#[tokio::test]
async fn when_session_connects_then_default_room_is_joined_and_snapshot_applied() {
    let server = MockServer::start().await;
    let mut client = Client::start(&server, "hero");

    client.tick_until(|e| matches!(e, SyncEvent::Connected)).await;
    let joins = server.wait_for_frames("room-join", 1).await;
    assert_eq!(joins[0]["data"]["roomId"], "lobby");
    assert_eq!(joins[0]["data"]["playerId"], "hero");

    server.push(json!({ "type": "room-join", "data": { "roomId": "lobby", "name": "Lobby" } }));
    server.push(json!({
        "type": "room-state",
        "data": {
            "id": "lobby",
            "players": {
                "rogue": { "id": "rogue", "position": { "x": 40.0, "y": 0.0 }, "roomId": "lobby" }
            },
            "entities": {
                "chest-1": { "id": "chest-1", "type": "chest", "position": { "x": 5.0, "y": 5.0 } }
            },
            "lastUpdated": 10
        }
    }));

    client
        .tick_until(|e| matches!(e, SyncEvent::EntityAdded { .. }))
        .await;

    assert!(client.seen.contains(&SyncEvent::RoomJoined("lobby".to_string())));
    assert!(client.seen.contains(&SyncEvent::PlayerJoined("rogue".to_string())));
    assert_eq!(
        client.session.world().room("lobby").map(|r| r.name.as_str()),
        Some("Lobby")
    );
    assert!(client.session.remote_player("rogue").is_some());
}

#[tokio::test]
async fn when_local_player_moves_then_inputs_reach_server_and_correction_is_applied() {
    let server = MockServer::start().await;
    let mut client = Client::start(&server, "hero");
    client.tick_until(|e| matches!(e, SyncEvent::Connected)).await;

    client.session.update_player_input(Input {
        right: true,
        timestamp: 1,
        ..Default::default()
    });
    let inputs = client.tick_until_frame(&server, "player-input").await;
    assert_eq!(inputs[0]["data"]["playerId"], "hero");
    assert_eq!(inputs[0]["data"]["input"]["right"], true);

    server.push(json!({
        "type": "player-move",
        "data": {
            "id": "hero",
            "position": { "x": 500.0, "y": 0.0 },
            "roomId": "lobby",
            "lastUpdated": 1
        }
    }));
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        client.tick();
        let local = client.session.local_player().expect("local player");
        if local.player.position.x >= 500.0 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "correction not applied");
        tokio::time::sleep(Duration::from_millis(16)).await;
    }
    let local = client.session.local_player().expect("local player");
    assert!(local.player.position.x >= 500.0);
    assert!(local.player.position.y.abs() < f32::EPSILON);
}

#[tokio::test]
async fn when_server_drops_then_session_rejoins_current_room() {
    let server = MockServer::start().await;
    let mut client = Client::start(&server, "hero");
    client.tick_until(|e| matches!(e, SyncEvent::Connected)).await;
    server.wait_for_frames("room-join", 1).await;

    server.drop_connections();
    client.tick_until(|e| matches!(e, SyncEvent::Disconnected)).await;
    client.tick_until(|e| matches!(e, SyncEvent::Connected)).await;

    let joins = server.wait_for_frames("room-join", 2).await;
    assert!(joins.iter().all(|f| f["data"]["roomId"] == "lobby"));
}

#[tokio::test]
async fn when_session_shuts_down_then_transport_closes_cleanly() {
    let server = MockServer::start().await;
    let mut client = Client::start(&server, "hero");
    client.tick_until(|e| matches!(e, SyncEvent::Connected)).await;

    client.session.update_local_player_position(Position::new(3.0, 4.0));
    server.wait_for_frames("player-move", 1).await;
    client.session.shutdown();

    client.tick_until(|e| matches!(e, SyncEvent::Disconnected)).await;
    assert!(client.session.local_player().is_none());
    let mut state = client.transport.subscribe_state();
    tokio::time::timeout(
        WAIT,
        state.wait_for(|s| *s == player_sync::use_cases::ConnectionState::Disconnected),
    )
    .await
    .expect("closed in time")
    .expect("transport alive");
}
