/// Gameplay tuning for prediction, reconciliation, and interpolation.
///
/// Keep this separate from runtime/transport configuration (endpoints, timers, retry policy).

#[derive(Debug, Clone, Copy)]
pub struct SyncTuning {
    /// Maximum number of unacknowledged predicted ticks kept for reconciliation.
    pub pending_capacity: usize,

    /// Maximum number of buffered target positions per remote player.
    pub interpolation_capacity: usize,

    /// Per-axis divergence (world units) above which the local player snaps to the server.
    pub reconciliation_threshold: f32,

    /// Distance (world units) at which a remote player is considered to have reached a target.
    pub arrival_radius: f32,

    /// Movement speed assigned to freshly initialized players, in units per second.
    pub default_speed: f32,

    /// How many times per second local input is forwarded to the server.
    pub input_send_rate: u32,
}

impl SyncTuning {
    /// Minimum spacing between two forwarded inputs, in milliseconds.
    pub fn input_send_interval_ms(&self) -> f64 {
        1000.0 / f64::from(self.input_send_rate.max(1))
    }
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            pending_capacity: 10,
            interpolation_capacity: 5,
            reconciliation_threshold: 50.0,
            arrival_radius: 5.0,
            default_speed: 150.0,
            input_send_rate: 20,
        }
    }
}
