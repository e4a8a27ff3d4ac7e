// Room cache and snapshot diffing; drives the state engine's room membership.

use crate::domain::{EntityState, PlayerState, RoomState};
use crate::use_cases::state_engine::StateEngine;
use crate::use_cases::types::SyncEvent;
use std::collections::HashMap;
use tracing::{debug, info};

/// Callback invoked when an entity of a registered type appears in the current room.
pub type EntityCallback = Box<dyn FnMut(&EntityState) + Send>;

pub struct WorldCoordinator {
    rooms: HashMap<String, RoomState>,
    current_room: Option<String>,
    entity_callbacks: HashMap<String, Vec<EntityCallback>>,
    // None keeps every room for the process lifetime.
    max_cached_rooms: Option<usize>,
}

impl WorldCoordinator {
    pub fn new(max_cached_rooms: Option<usize>) -> Self {
        Self {
            rooms: HashMap::new(),
            current_room: None,
            entity_callbacks: HashMap::new(),
            max_cached_rooms,
        }
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub fn room(&self, room_id: &str) -> Option<&RoomState> {
        self.rooms.get(room_id)
    }

    pub fn cached_room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn on_entity_type(&mut self, kind: impl Into<String>, callback: EntityCallback) {
        self.entity_callbacks
            .entry(kind.into())
            .or_default()
            .push(callback);
    }

    /// Optimistically enters a room and asks the server to join it.
    pub fn join_room(&mut self, room_id: &str, engine: &mut StateEngine) {
        self.current_room = Some(room_id.to_string());
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomState::empty(room_id));
        engine.set_room(room_id);
        self.evict_stale_rooms();
    }

    pub fn leave_room(&mut self, engine: &mut StateEngine) {
        let Some(room_id) = self.current_room.take() else {
            return;
        };
        engine.leave_room();
        info!(room_id = %room_id, "left room");
        engine.push_event(SyncEvent::RoomLeft(room_id));
    }

    /// Handles the server's join acknowledgment; the server may place us in another room.
    pub fn confirm_room(&mut self, room_id: &str, name: Option<String>, engine: &mut StateEngine) {
        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomState::empty(room_id));
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            room.name = name;
        }

        if self.current_room.as_deref() != Some(room_id) {
            info!(room_id, "server moved session to room");
            self.current_room = Some(room_id.to_string());
            engine.adopt_room(room_id);
        }
        engine.push_event(SyncEvent::RoomJoined(room_id.to_string()));
        self.evict_stale_rooms();
    }

    /// Applies a full room snapshot; diff events fire only for the current room.
    pub fn apply_snapshot(&mut self, snapshot: RoomState, engine: &mut StateEngine) {
        let room_id = snapshot.id.clone();
        let is_current = self.current_room.as_deref() == Some(room_id.as_str());
        let cached = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| RoomState::empty(room_id.as_str()));

        if snapshot.last_updated < cached.last_updated {
            debug!(
                room_id = %room_id,
                snapshot = snapshot.last_updated,
                cached = cached.last_updated,
                "stale room snapshot ignored"
            );
            return;
        }

        if is_current {
            let mut added: Vec<&EntityState> = snapshot
                .entities
                .values()
                .filter(|entity| !cached.entities.contains_key(&entity.id))
                .collect();
            added.sort_by(|a, b| a.id.cmp(&b.id));
            let mut removed: Vec<&String> = cached
                .entities
                .keys()
                .filter(|id| !snapshot.entities.contains_key(*id))
                .collect();
            removed.sort();

            for entity in added {
                if let Some(callbacks) = self.entity_callbacks.get_mut(&entity.kind) {
                    for callback in callbacks.iter_mut() {
                        callback(entity);
                    }
                }
                engine.push_event(SyncEvent::EntityAdded {
                    room_id: room_id.clone(),
                    entity: entity.clone(),
                });
            }
            for entity_id in removed {
                engine.push_event(SyncEvent::EntityRemoved {
                    room_id: room_id.clone(),
                    entity_id: entity_id.clone(),
                });
            }
        } else {
            debug!(room_id = %room_id, "snapshot cached for inactive room");
        }

        let RoomState {
            name,
            players,
            entities,
            last_updated,
            ..
        } = snapshot;
        if !name.is_empty() {
            cached.name = name;
        }
        cached.entities = entities;
        cached.last_updated = last_updated;

        if is_current {
            let mut player_ids: Vec<&String> = players.keys().collect();
            player_ids.sort();
            for id in player_ids {
                engine.apply_player_update(players[id].clone());
            }
        } else if let Some(local) = engine
            .local_player_id()
            .and_then(|id| players.get(id))
            .cloned()
        {
            engine.reconcile(&local);
        }
        // Players merge; departures only come from explicit leave messages.
        cached.players.extend(players);

        self.evict_stale_rooms();
    }

    pub fn player_joined(&mut self, state: PlayerState, engine: &mut StateEngine) {
        if is_local(&state, engine) {
            self.cache_player(&state);
            engine.reconcile(&state);
            return;
        }
        let Some(room_id) = self.room_for(&state) else {
            debug!(player_id = %state.id, "join without a room; ignoring");
            return;
        };
        let is_current = self.current_room.as_deref() == Some(room_id.as_str());
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| RoomState::empty(room_id.as_str()))
            .players
            .insert(state.id.clone(), state.clone());

        if is_current {
            engine.add_remote_player(state);
        }
    }

    pub fn player_moved(&mut self, state: PlayerState, engine: &mut StateEngine) {
        // Local state follows the server whatever room the message names.
        if is_local(&state, engine) {
            self.cache_player(&state);
            engine.reconcile(&state);
            return;
        }
        let room_id = self.room_for(&state);
        let is_current = room_id.is_none() || room_id == self.current_room;
        if let Some(room) = room_id.and_then(|id| self.rooms.get_mut(&id)) {
            room.players.insert(state.id.clone(), state.clone());
        }

        if is_current {
            engine.apply_player_update(state);
        } else {
            debug!(player_id = %state.id, "move for inactive room cached only");
        }
    }

    pub fn player_left(
        &mut self,
        player_id: &str,
        room_id: Option<String>,
        engine: &mut StateEngine,
    ) {
        let room_id = room_id
            .filter(|id| !id.is_empty())
            .or_else(|| self.current_room.clone());
        if let Some(room) = room_id.as_ref().and_then(|id| self.rooms.get_mut(id)) {
            room.players.remove(player_id);
        }

        if room_id.is_none() || room_id == self.current_room {
            engine.remove_remote_player(player_id);
        }
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
        self.current_room = None;
    }

    // Refreshes the player in an already cached room; never creates one.
    fn cache_player(&mut self, state: &PlayerState) {
        if let Some(room) = self
            .room_for(state)
            .and_then(|room_id| self.rooms.get_mut(&room_id))
        {
            room.players.insert(state.id.clone(), state.clone());
        }
    }

    fn room_for(&self, state: &PlayerState) -> Option<String> {
        if state.room_id.is_empty() {
            self.current_room.clone()
        } else {
            Some(state.room_id.clone())
        }
    }

    // Drops the least recently updated inactive rooms once the cache exceeds its bound.
    fn evict_stale_rooms(&mut self) {
        let Some(max) = self.max_cached_rooms else {
            return;
        };
        while self.rooms.len() > max.max(1) {
            let oldest = self
                .rooms
                .values()
                .filter(|room| self.current_room.as_deref() != Some(room.id.as_str()))
                .min_by(|a, b| {
                    a.last_updated
                        .cmp(&b.last_updated)
                        .then_with(|| a.id.cmp(&b.id))
                })
                .map(|room| room.id.clone());
            let Some(oldest) = oldest else {
                break;
            };
            debug!(room_id = %oldest, "evicted cached room");
            self.rooms.remove(&oldest);
        }
    }
}

fn is_local(state: &PlayerState, engine: &StateEngine) -> bool {
    engine.local_player_id() == Some(state.id.as_str())
}
