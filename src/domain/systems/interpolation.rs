use crate::domain::state::{Direction, Position, RemotePlayerState, animation_key};
use std::collections::VecDeque;

/// Appends a target, dropping the oldest points so at most `capacity` remain.
pub fn push_target(points: &mut VecDeque<Position>, target: Position, capacity: usize) {
    points.push_back(target);
    while points.len() > capacity.max(1) {
        points.pop_front();
    }
}

/// Facing derived from the dominant axis of a step (screen coordinates, +y is down).
pub fn dominant_direction(dx: f32, dy: f32) -> Direction {
    if dx.abs() > dy.abs() {
        if dx > 0.0 { Direction::Right } else { Direction::Left }
    } else if dy > 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}

/// Advances a remote player one tick toward the head of its interpolation queue.
pub fn tick_remote(remote: &mut RemotePlayerState, delta_ms: f32, arrival_radius: f32) {
    let Some(&target) = remote.interpolation_points.front() else {
        settle(remote);
        return;
    };

    let player = &mut remote.player;
    let dx = target.x - player.position.x;
    let dy = target.y - player.position.y;
    let distance = (dx * dx + dy * dy).sqrt();

    if distance > 0.0 {
        let step = (player.speed * (delta_ms / 1000.0)).min(distance);
        player.position.x += dx / distance * step;
        player.position.y += dy / distance * step;
        player.direction = dominant_direction(dx, dy);
        player.is_moving = true;
        player.animation = animation_key(player.direction, true);
    }

    if player.position.distance_to(target) <= arrival_radius {
        player.position = target;
        remote.interpolation_points.pop_front();
        if remote.interpolation_points.is_empty() {
            settle(remote);
        }
    }
}

fn settle(remote: &mut RemotePlayerState) {
    let player = &mut remote.player;
    player.is_moving = false;
    player.animation = animation_key(player.direction, false);
}
