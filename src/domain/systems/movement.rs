use crate::domain::state::{Direction, Input, Position};

// Result of integrating one tick of local input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementStep {
    pub position: Position,
    pub direction: Direction,
    pub moving: bool,
}

/// Unit velocity from the directional flags.
///
/// Opposing flags resolve deterministically: up beats down, left beats right. The result is
/// not normalized, so a diagonal moves at full speed on both axes.
pub fn velocity(input: &Input) -> (f32, f32) {
    let vx = if input.left {
        -1.0
    } else if input.right {
        1.0
    } else {
        0.0
    };
    let vy = if input.up {
        -1.0
    } else if input.down {
        1.0
    } else {
        0.0
    };
    (vx, vy)
}

/// Facing for an input: the first set flag in up, down, left, right order.
pub fn facing(input: &Input) -> Option<Direction> {
    if input.up {
        Some(Direction::Up)
    } else if input.down {
        Some(Direction::Down)
    } else if input.left {
        Some(Direction::Left)
    } else if input.right {
        Some(Direction::Right)
    } else {
        None
    }
}

// delta_ms is the frame time in milliseconds; speed is in units per second.
pub fn predict_step(
    position: Position,
    current: Direction,
    input: &Input,
    speed: f32,
    delta_ms: f32,
) -> MovementStep {
    let (vx, vy) = velocity(input);
    let scale = speed * (delta_ms / 1000.0);
    let moving = vx != 0.0 || vy != 0.0;

    MovementStep {
        position: Position::new(position.x + vx * scale, position.y + vy * scale),
        direction: facing(input).unwrap_or(current),
        moving,
    }
}
