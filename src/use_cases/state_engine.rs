// Local prediction/reconciliation and remote interpolation for the active room.

use crate::domain::state::animation_key;
use crate::domain::systems::reconciliation::{self, ReconcileOutcome};
use crate::domain::systems::{interpolation, movement};
use crate::domain::{
    AvatarHandle, Input, LocalPlayerState, MessageOutbox, OutboundMessage, PendingUpdate,
    PlayerState, Position, RemotePlayerState, SyncTuning,
};
use crate::use_cases::types::SyncEvent;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct StateEngine {
    tuning: SyncTuning,
    outbox: Box<dyn MessageOutbox>,
    // Render-layer handle for the local player, if a collaborator attached one.
    avatar: Option<Box<dyn AvatarHandle>>,
    local: Option<LocalPlayerState>,
    remotes: HashMap<String, RemotePlayerState>,
    current_room: Option<String>,
    // Simulation time (ms) of the last forwarded input and the input itself.
    last_input_sent: Option<(f64, Input)>,
    events: Vec<SyncEvent>,
}

impl StateEngine {
    pub fn new(tuning: SyncTuning, outbox: Box<dyn MessageOutbox>) -> Self {
        Self {
            tuning,
            outbox,
            avatar: None,
            local: None,
            remotes: HashMap::new(),
            current_room: None,
            last_input_sent: None,
            events: Vec::new(),
        }
    }

    pub fn attach_avatar(&mut self, avatar: Box<dyn AvatarHandle>) {
        self.avatar = Some(avatar);
        self.sync_avatar();
    }

    pub fn detach_avatar(&mut self) -> Option<Box<dyn AvatarHandle>> {
        self.avatar.take()
    }

    /// Creates the single local player, replacing any previous one.
    pub fn init_local_player(
        &mut self,
        id: impl Into<String>,
        username: impl Into<String>,
    ) -> &LocalPlayerState {
        let mut player = PlayerState::new(id, username, self.tuning.default_speed);
        if let Some(room_id) = &self.current_room {
            player.room_id = room_id.clone();
        }

        if let Some(previous) = &self.local {
            warn!(
                previous_id = %previous.player.id,
                player_id = %player.id,
                "replacing existing local player"
            );
        }
        // An id is never tracked as both local and remote.
        if self.remotes.remove(&player.id).is_some() {
            debug!(player_id = %player.id, "dropped remote entry for local id");
            self.events.push(SyncEvent::PlayerLeft(player.id.clone()));
        }

        info!(player_id = %player.id, username = %player.username, "local player initialized");
        self.last_input_sent = None;
        let local = self.local.insert(LocalPlayerState::new(player));
        if let Some(avatar) = self.avatar.as_mut() {
            avatar.sync(
                local.player.position,
                local.player.direction,
                &local.player.animation,
            );
        }
        local
    }

    pub fn destroy_local_player(&mut self) {
        if let Some(local) = self.local.take() {
            info!(player_id = %local.player.id, "local player destroyed");
        }
        self.last_input_sent = None;
    }

    pub fn local_player(&self) -> Option<&LocalPlayerState> {
        self.local.as_ref()
    }

    pub fn local_player_id(&self) -> Option<&str> {
        self.local.as_ref().map(|local| local.player.id.as_str())
    }

    pub fn remote_player(&self, id: &str) -> Option<&RemotePlayerState> {
        self.remotes.get(id)
    }

    pub fn remote_players(&self) -> impl Iterator<Item = &RemotePlayerState> {
        self.remotes.values()
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub fn tuning(&self) -> &SyncTuning {
        &self.tuning
    }

    pub fn update_player_input(&mut self, input: Input) {
        match self.local.as_mut() {
            Some(local) => local.inputs = input,
            None => debug!("input ignored without a local player"),
        }
    }

    /// Accepts an externally resolved position for the local player and reports it upstream.
    pub fn update_local_player_position(&mut self, position: Position) {
        if !position.is_finite() {
            warn!(x = position.x, y = position.y, "non-finite local position ignored");
            return;
        }
        let Some(local) = self.local.as_mut() else {
            debug!("position ignored without a local player");
            return;
        };
        if local.player.position == position {
            return;
        }

        local.player.position = position;
        self.outbox.send(OutboundMessage::Move(local.player.clone()));
        self.sync_avatar();
    }

    /// Advances prediction and interpolation by one tick.
    ///
    /// `time` is the loop clock in milliseconds; `delta` is the frame time in milliseconds.
    pub fn update(&mut self, time: f64, delta: f32) {
        self.predict_local(delta);
        self.forward_input(time);

        for remote in self.remotes.values_mut() {
            interpolation::tick_remote(remote, delta, self.tuning.arrival_radius);
        }
    }

    fn predict_local(&mut self, delta: f32) {
        let Some(local) = self.local.as_mut() else {
            return;
        };

        let input = local.inputs;
        let player = &mut local.player;
        let step =
            movement::predict_step(player.position, player.direction, &input, player.speed, delta);
        player.position = step.position;
        player.direction = step.direction;
        player.is_moving = step.moving;
        player.animation = animation_key(step.direction, step.moving);

        if step.moving {
            let out_of_order = local
                .pending_updates
                .back()
                .is_some_and(|last| last.input.timestamp > input.timestamp);
            if out_of_order {
                debug!(timestamp = input.timestamp, "stale input not buffered");
            } else {
                local.pending_updates.push_back(PendingUpdate {
                    input,
                    predicted_position: step.position,
                    server_acknowledged: false,
                });
                while local.pending_updates.len() > self.tuning.pending_capacity {
                    local.pending_updates.pop_front();
                }
            }
        }

        self.sync_avatar();
    }

    // Inputs go upstream at a fixed cadence, independent of the tick rate.
    fn forward_input(&mut self, time: f64) {
        let Some(local) = self.local.as_ref() else {
            return;
        };
        let input = local.inputs;

        let due = match self.last_input_sent {
            None => true,
            Some((sent_at, _)) => time - sent_at >= self.tuning.input_send_interval_ms(),
        };
        if !due {
            return;
        }

        // Idle input is only worth sending once, so the server sees the release.
        let changed = self
            .last_input_sent
            .is_none_or(|(_, last)| !same_controls(&last, &input));
        if !input.is_directional() && !input.action && !changed {
            return;
        }

        self.outbox.send(OutboundMessage::Input {
            player_id: local.player.id.clone(),
            input,
            position: local.player.position,
        });
        self.last_input_sent = Some((time, input));
    }

    /// Applies authoritative state for the local player.
    pub fn reconcile(&mut self, server: &PlayerState) -> Option<ReconcileOutcome> {
        let Some(local) = self.local.as_mut() else {
            warn!(player_id = %server.id, "state sync without a local player; ignoring");
            return None;
        };
        if local.player.id != server.id {
            warn!(
                player_id = %server.id,
                local_id = %local.player.id,
                "state sync for unknown local id; ignoring"
            );
            return None;
        }

        let outcome =
            reconciliation::reconcile(local, server, self.tuning.reconciliation_threshold);
        if outcome.snapped {
            debug!(
                player_id = %server.id,
                x = server.position.x,
                y = server.position.y,
                "local position corrected by server"
            );
            self.sync_avatar();
        }
        Some(outcome)
    }

    /// Routes a player update: local state is reconciled, remote state is interpolated.
    pub fn apply_player_update(&mut self, state: PlayerState) {
        if self.local_player_id() == Some(state.id.as_str()) {
            self.reconcile(&state);
            return;
        }

        let capacity = self.tuning.interpolation_capacity;
        match self.remotes.get_mut(&state.id) {
            Some(remote) => {
                let target = state.position;
                merge_remote(&mut remote.player, state);
                interpolation::push_target(&mut remote.interpolation_points, target, capacity);
            }
            None => {
                let target = state.position;
                let id = state.id.clone();
                let mut remote = RemotePlayerState::new(state);
                interpolation::push_target(&mut remote.interpolation_points, target, capacity);
                self.remotes.insert(id.clone(), remote);
                info!(player_id = %id, "remote player appeared");
                self.events.push(SyncEvent::PlayerJoined(id));
            }
        }
    }

    /// Registers a remote player from an explicit join; placed directly at its position.
    pub fn add_remote_player(&mut self, state: PlayerState) {
        if self.local_player_id() == Some(state.id.as_str()) {
            self.reconcile(&state);
            return;
        }

        match self.remotes.get_mut(&state.id) {
            Some(remote) => merge_remote(&mut remote.player, state),
            None => {
                let id = state.id.clone();
                self.remotes.insert(id.clone(), RemotePlayerState::new(state));
                info!(player_id = %id, "remote player joined");
                self.events.push(SyncEvent::PlayerJoined(id));
            }
        }
    }

    pub fn remove_remote_player(&mut self, id: &str) -> bool {
        if self.remotes.remove(id).is_some() {
            info!(player_id = %id, "remote player left");
            self.events.push(SyncEvent::PlayerLeft(id.to_string()));
            true
        } else {
            debug!(player_id = %id, "leave for unknown remote player");
            false
        }
    }

    /// Moves the local session to another room; a no-op when the room is unchanged.
    pub fn set_room(&mut self, room_id: &str) {
        self.transition_room(room_id, true);
    }

    /// Follows a server-initiated room move without announcing it back.
    pub fn adopt_room(&mut self, room_id: &str) {
        self.transition_room(room_id, false);
    }

    pub fn leave_room(&mut self) {
        let Some(room_id) = self.current_room.take() else {
            return;
        };
        self.clear_remotes();
        self.outbox.send(OutboundMessage::LeaveRoom {
            room_id,
            player_id: self.local_player_id().unwrap_or_default().to_string(),
        });
        if let Some(local) = self.local.as_mut() {
            local.player.room_id.clear();
        }
    }

    fn transition_room(&mut self, room_id: &str, announce: bool) {
        if self.current_room.as_deref() == Some(room_id) {
            return;
        }

        let previous = self.current_room.replace(room_id.to_string());
        self.clear_remotes();

        if announce {
            let player_id = self.local_player_id().unwrap_or_default().to_string();
            if let Some(old) = &previous {
                self.outbox.send(OutboundMessage::LeaveRoom {
                    room_id: old.clone(),
                    player_id: player_id.clone(),
                });
            }
            self.outbox.send(OutboundMessage::JoinRoom {
                room_id: room_id.to_string(),
                player_id,
            });
        }

        if let Some(local) = self.local.as_mut() {
            local.player.room_id = room_id.to_string();
        }

        info!(previous = ?previous, room_id, "room changed");
        self.events.push(SyncEvent::RoomChanged {
            previous,
            current: room_id.to_string(),
        });
    }

    // Remote players belong to the room they were seen in.
    fn clear_remotes(&mut self) {
        let mut cleared: Vec<String> = self.remotes.drain().map(|(id, _)| id).collect();
        cleared.sort();
        for id in cleared {
            self.events.push(SyncEvent::PlayerLeft(id));
        }
    }

    /// Re-announces the current room, e.g. after the transport reconnects.
    pub fn rejoin_current_room(&self) {
        let Some(room_id) = &self.current_room else {
            return;
        };
        self.outbox.send(OutboundMessage::JoinRoom {
            room_id: room_id.clone(),
            player_id: self.local_player_id().unwrap_or_default().to_string(),
        });
    }

    pub fn send_chat(&self, text: impl Into<String>, timestamp: u64) {
        let Some(local) = self.local.as_ref() else {
            warn!("chat ignored without a local player");
            return;
        };
        self.outbox.send(OutboundMessage::Chat {
            player_id: local.player.id.clone(),
            username: local.player.username.clone(),
            text: text.into(),
            timestamp,
        });
    }

    pub fn push_event(&mut self, event: SyncEvent) {
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drops all remote players and the local player; used on teardown.
    pub fn clear(&mut self) {
        self.remotes.clear();
        self.destroy_local_player();
        self.current_room = None;
    }

    fn sync_avatar(&mut self) {
        if let (Some(avatar), Some(local)) = (self.avatar.as_mut(), self.local.as_ref()) {
            avatar.sync(
                local.player.position,
                local.player.direction,
                &local.player.animation,
            );
        }
    }
}

fn same_controls(a: &Input, b: &Input) -> bool {
    a.up == b.up && a.down == b.down && a.left == b.left && a.right == b.right && a.action == b.action
}

// Server-owned fields are copied; position, facing, and animation stay with interpolation.
fn merge_remote(player: &mut PlayerState, update: PlayerState) {
    player.health = update.health;
    player.username = update.username;
    player.room_id = update.room_id;
    player.speed = update.speed;
    player.last_updated = player.last_updated.max(update.last_updated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;
    use crate::use_cases::test_support::{RecordingAvatar, RecordingOutbox};

    fn engine() -> (StateEngine, RecordingOutbox) {
        let outbox = RecordingOutbox::new();
        let engine = StateEngine::new(SyncTuning::default(), Box::new(outbox.clone()));
        (engine, outbox)
    }

    fn right(timestamp: u64) -> Input {
        Input {
            right: true,
            timestamp,
            ..Default::default()
        }
    }

    fn remote_state(id: &str, x: f32, y: f32) -> PlayerState {
        let mut state = PlayerState::new(id, id, 100.0);
        state.position = Position::new(x, y);
        state
    }

    #[test]
    fn when_ticking_without_server_updates_then_position_is_sum_of_deltas() {
        let (mut engine, _) = engine();
        engine.init_local_player("hero", "Hero");

        let deltas = [250.0, 125.0, 500.0, 62.5];
        let mut expected_x = 0.0;
        for (i, delta) in deltas.into_iter().enumerate() {
            engine.update_player_input(right(i as u64 + 1));
            engine.update(i as f64 * 100.0, delta);
            expected_x += 150.0 * (delta / 1000.0);
        }

        let local = engine.local_player().expect("local player");
        assert_eq!(local.player.position, Position::new(expected_x, 0.0));
        assert_eq!(local.player.animation, "walk-right");
        assert!(local.player.is_moving);
    }

    #[test]
    fn when_more_than_capacity_ticks_then_oldest_pending_updates_are_evicted() {
        let (mut engine, _) = engine();
        engine.init_local_player("hero", "Hero");

        for ts in 1..=15 {
            engine.update_player_input(right(ts));
            engine.update(ts as f64 * 16.0, 16.0);
        }

        let pending = &engine.local_player().expect("local").pending_updates;
        assert_eq!(pending.len(), 10);
        assert_eq!(pending.front().map(|p| p.input.timestamp), Some(6));
        assert_eq!(pending.back().map(|p| p.input.timestamp), Some(15));
        assert!(pending.iter().all(|p| !p.server_acknowledged));
    }

    #[test]
    fn when_idle_tick_then_no_pending_update_and_idle_animation() {
        let (mut engine, _) = engine();
        engine.init_local_player("hero", "Hero");

        engine.update(0.0, 16.0);

        let local = engine.local_player().expect("local");
        assert!(local.pending_updates.is_empty());
        assert_eq!(local.player.animation, "idle-down");
    }

    #[test]
    fn when_ticking_faster_than_send_rate_then_inputs_are_rate_limited() {
        let (mut engine, outbox) = engine();
        engine.init_local_player("hero", "Hero");
        engine.update_player_input(right(1));

        // 50ms cadence: forwards at 0, 64, and 128.
        for time in [0.0, 16.0, 32.0, 48.0, 64.0, 80.0, 96.0, 112.0, 128.0] {
            engine.update(time, 16.0);
        }

        let inputs = outbox
            .sent()
            .into_iter()
            .filter(|m| matches!(m, OutboundMessage::Input { .. }))
            .count();
        assert_eq!(inputs, 3);
    }

    #[test]
    fn when_input_released_then_release_is_forwarded_once() {
        let (mut engine, outbox) = engine();
        engine.init_local_player("hero", "Hero");
        engine.update_player_input(right(1));
        engine.update(0.0, 16.0);

        engine.update_player_input(Input {
            timestamp: 2,
            ..Default::default()
        });
        engine.update(100.0, 16.0);
        engine.update(200.0, 16.0);

        let inputs = outbox
            .sent()
            .into_iter()
            .filter(|m| matches!(m, OutboundMessage::Input { .. }))
            .count();
        assert_eq!(inputs, 2);
    }

    #[test]
    fn when_server_state_arrives_for_local_then_it_is_reconciled_not_added_as_remote() {
        let (mut engine, _) = engine();
        engine.init_local_player("hero", "Hero");
        for ts in 1..=4 {
            engine.update_player_input(right(ts * 10));
            engine.update(ts as f64 * 16.0, 16.0);
        }

        let mut server = remote_state("hero", 500.0, 0.0);
        server.last_updated = 20;
        engine.apply_player_update(server);

        let local = engine.local_player().expect("local");
        assert_eq!(local.player.position, Position::new(500.0, 0.0));
        assert_eq!(local.pending_updates.len(), 2);
        assert!(engine.remote_player("hero").is_none());
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn when_reconcile_without_local_player_then_it_is_ignored() {
        let (mut engine, _) = engine();
        assert!(engine.reconcile(&remote_state("ghost", 0.0, 0.0)).is_none());
    }

    #[test]
    fn when_unknown_remote_moves_then_it_is_created_with_join_event() {
        let (mut engine, _) = engine();
        engine.init_local_player("hero", "Hero");

        engine.apply_player_update(remote_state("rogue", 10.0, 0.0));

        let remote = engine.remote_player("rogue").expect("remote created");
        assert_eq!(remote.interpolation_points.len(), 1);
        assert_eq!(
            engine.drain_events(),
            vec![SyncEvent::PlayerJoined("rogue".to_string())]
        );
    }

    #[test]
    fn when_remote_updates_overflow_then_only_freshest_points_remain() {
        let (mut engine, _) = engine();
        engine.add_remote_player(remote_state("rogue", 0.0, 0.0));

        for i in 1..=8 {
            engine.apply_player_update(remote_state("rogue", i as f32 * 10.0, 0.0));
        }

        let points = &engine.remote_player("rogue").expect("remote").interpolation_points;
        assert_eq!(points.len(), 5);
        assert_eq!(points.front(), Some(&Position::new(40.0, 0.0)));
    }

    #[test]
    fn when_room_changes_then_remotes_are_cleared_and_leave_join_sent_in_order() {
        let (mut engine, outbox) = engine();
        engine.init_local_player("hero", "Hero");
        engine.set_room("hall");
        engine.add_remote_player(remote_state("rogue", 0.0, 0.0));
        engine.drain_events();
        outbox.clear();

        engine.set_room("crypt");

        assert_eq!(engine.remote_players().count(), 0);
        assert_eq!(
            outbox.sent(),
            vec![
                OutboundMessage::LeaveRoom {
                    room_id: "hall".to_string(),
                    player_id: "hero".to_string(),
                },
                OutboundMessage::JoinRoom {
                    room_id: "crypt".to_string(),
                    player_id: "hero".to_string(),
                },
            ]
        );
        assert_eq!(
            engine.drain_events(),
            vec![
                SyncEvent::PlayerLeft("rogue".to_string()),
                SyncEvent::RoomChanged {
                    previous: Some("hall".to_string()),
                    current: "crypt".to_string(),
                },
            ]
        );
        assert_eq!(engine.local_player().expect("local").player.room_id, "crypt");
    }

    #[test]
    fn when_room_is_unchanged_then_set_room_is_a_no_op() {
        let (mut engine, outbox) = engine();
        engine.set_room("hall");
        outbox.clear();
        engine.drain_events();

        engine.set_room("hall");

        assert!(outbox.sent().is_empty());
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn when_avatar_attached_then_it_follows_predicted_position() {
        let (mut engine, _) = engine();
        let avatar = RecordingAvatar::new();
        engine.attach_avatar(Box::new(avatar.clone()));
        engine.init_local_player("hero", "Hero");

        engine.update_player_input(Input {
            up: true,
            timestamp: 1,
            ..Default::default()
        });
        engine.update(0.0, 1000.0);

        let (position, direction, animation) = avatar.last().expect("avatar synced");
        assert_eq!(position, Position::new(0.0, -150.0));
        assert_eq!(direction, Direction::Up);
        assert_eq!(animation, "walk-up");
    }

    #[test]
    fn when_external_position_pushed_then_move_is_sent_once() {
        let (mut engine, outbox) = engine();
        engine.init_local_player("hero", "Hero");

        engine.update_local_player_position(Position::new(12.0, 8.0));
        engine.update_local_player_position(Position::new(12.0, 8.0));
        engine.update_local_player_position(Position::new(f32::NAN, 8.0));

        let moves: Vec<OutboundMessage> = outbox
            .sent()
            .into_iter()
            .filter(|m| matches!(m, OutboundMessage::Move(_)))
            .collect();
        assert_eq!(moves.len(), 1);
        assert_eq!(
            engine.local_player().expect("local").player.position,
            Position::new(12.0, 8.0)
        );
    }

    #[test]
    fn when_local_initialized_with_remote_id_then_remote_entry_is_dropped() {
        let (mut engine, _) = engine();
        engine.add_remote_player(remote_state("hero", 0.0, 0.0));
        engine.drain_events();

        engine.init_local_player("hero", "Hero");

        assert!(engine.remote_player("hero").is_none());
        assert!(engine.local_player().is_some());
        assert_eq!(
            engine.drain_events(),
            vec![SyncEvent::PlayerLeft("hero".to_string())]
        );
    }
}
