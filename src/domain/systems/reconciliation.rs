use crate::domain::state::{LocalPlayerState, PlayerState};

// What a reconciliation pass did to the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub discarded: usize,
    pub snapped: bool,
}

/// Applies an authoritative server state to the local player.
///
/// Pending updates at or before `server.last_updated` are dropped. Position is only replaced
/// when either axis diverges by more than `threshold`. Vitals, speed, and room always follow
/// the server.
pub fn reconcile(
    local: &mut LocalPlayerState,
    server: &PlayerState,
    threshold: f32,
) -> ReconcileOutcome {
    let before = local.pending_updates.len();
    local
        .pending_updates
        .retain(|pending| pending.input.timestamp > server.last_updated);
    let discarded = before - local.pending_updates.len();

    let player = &mut local.player;
    let dx = (player.position.x - server.position.x).abs();
    let dy = (player.position.y - server.position.y).abs();
    let snapped = dx > threshold || dy > threshold;
    if snapped {
        player.position = server.position;
    }

    player.health = server.health;
    player.speed = server.speed;
    player.room_id = server.room_id.clone();
    player.last_updated = player.last_updated.max(server.last_updated);

    ReconcileOutcome { discarded, snapped }
}
