// Session façade: routes transport events into the engine and world, exposes one event stream.

use crate::domain::{
    AvatarHandle, Clock, Input, LocalPlayerState, MessageOutbox, Position, RemotePlayerState,
    SyncTuning, TransportControl,
};
use crate::use_cases::state_engine::StateEngine;
use crate::use_cases::types::{InboundMessage, SyncEvent, TransportEvent};
use crate::use_cases::world::{EntityCallback, WorldCoordinator};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub tuning: SyncTuning,
    // Joined on the first connect when no room was chosen yet.
    pub default_room: Option<String>,
    pub max_cached_rooms: Option<usize>,
}

pub struct GameSession {
    engine: StateEngine,
    world: WorldCoordinator,
    control: Box<dyn TransportControl>,
    clock: Box<dyn Clock>,
    default_room: Option<String>,
    connected_once: bool,
}

impl GameSession {
    pub fn new(
        settings: SessionSettings,
        outbox: Box<dyn MessageOutbox>,
        control: Box<dyn TransportControl>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            engine: StateEngine::new(settings.tuning, outbox),
            world: WorldCoordinator::new(settings.max_cached_rooms),
            control,
            clock,
            default_room: settings.default_room.filter(|room| !room.is_empty()),
            connected_once: false,
        }
    }

    pub fn engine(&self) -> &StateEngine {
        &self.engine
    }

    pub fn world(&self) -> &WorldCoordinator {
        &self.world
    }

    pub fn attach_avatar(&mut self, avatar: Box<dyn AvatarHandle>) {
        self.engine.attach_avatar(avatar);
    }

    pub fn on_entity_type(&mut self, kind: impl Into<String>, callback: EntityCallback) {
        self.world.on_entity_type(kind, callback);
    }

    pub fn init_local_player(
        &mut self,
        id: impl Into<String>,
        username: impl Into<String>,
    ) -> &LocalPlayerState {
        self.engine.init_local_player(id, username)
    }

    pub fn destroy_local_player(&mut self) {
        self.engine.destroy_local_player();
    }

    pub fn local_player(&self) -> Option<&LocalPlayerState> {
        self.engine.local_player()
    }

    pub fn remote_player(&self, id: &str) -> Option<&RemotePlayerState> {
        self.engine.remote_player(id)
    }

    pub fn remote_players(&self) -> impl Iterator<Item = &RemotePlayerState> {
        self.engine.remote_players()
    }

    pub fn update_player_input(&mut self, input: Input) {
        self.engine.update_player_input(input);
    }

    pub fn update_local_player_position(&mut self, position: Position) {
        self.engine.update_local_player_position(position);
    }

    pub fn update(&mut self, time: f64, delta: f32) {
        self.engine.update(time, delta);
    }

    pub fn join_room(&mut self, room_id: &str) {
        self.world.join_room(room_id, &mut self.engine);
    }

    pub fn leave_room(&mut self) {
        self.world.leave_room(&mut self.engine);
    }

    pub fn send_chat(&mut self, text: impl Into<String>) {
        let timestamp = self.clock.now_millis();
        self.engine.send_chat(text, timestamp);
    }

    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        self.engine.drain_events()
    }

    /// Applies every transport event that is already waiting, without blocking.
    pub fn poll(&mut self, events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_transport_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected { clean } => {
                info!(clean, "session disconnected");
                self.engine.push_event(SyncEvent::Disconnected);
            }
            TransportEvent::ReconnectScheduled { attempt, delay } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect pending");
            }
            TransportEvent::ReconnectFailed => {
                warn!("reconnect attempts exhausted");
                self.engine.push_event(SyncEvent::ReconnectFailed);
            }
            TransportEvent::Error(message) => {
                self.engine.push_event(SyncEvent::Error(message));
            }
            TransportEvent::Message(message) => self.handle_message(message),
        }
    }

    /// Tears down local state and closes the connection for good.
    pub fn shutdown(&mut self) {
        self.engine.clear();
        self.world.clear();
        self.control.disconnect();
        info!("session shut down");
    }

    fn on_connected(&mut self) {
        let first = !self.connected_once;
        self.connected_once = true;
        self.engine.push_event(SyncEvent::Connected);

        if self.world.current_room().is_some() {
            // A join issued before the first connect is already queued.
            if !first {
                self.engine.rejoin_current_room();
            }
        } else if let Some(room_id) = self.default_room.clone() {
            self.world.join_room(&room_id, &mut self.engine);
        }
    }

    fn handle_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::ConnectAck { player_id } => {
                info!(player_id = ?player_id, "server accepted connection");
            }
            InboundMessage::PlayerJoin(state) => {
                self.world.player_joined(state, &mut self.engine);
            }
            InboundMessage::PlayerLeave { player_id, room_id } => {
                self.world.player_left(&player_id, room_id, &mut self.engine);
            }
            InboundMessage::PlayerMove(state) => {
                self.world.player_moved(state, &mut self.engine);
            }
            InboundMessage::RoomJoin { room_id, name } => {
                self.world.confirm_room(&room_id, name, &mut self.engine);
            }
            InboundMessage::RoomState(room) => {
                self.world.apply_snapshot(room, &mut self.engine);
            }
            InboundMessage::Chat(chat) => {
                debug!(player_id = %chat.player_id, "chat received");
                self.engine.push_event(SyncEvent::ChatReceived(chat));
            }
            InboundMessage::Error { message, code } => {
                warn!(code = ?code, error = %message, "server reported error");
                self.engine.push_event(SyncEvent::Error(message));
            }
            InboundMessage::Heartbeat { timestamp } => {
                debug!(timestamp, "server heartbeat");
            }
        }
    }
}
