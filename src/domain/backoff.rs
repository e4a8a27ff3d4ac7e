// Reconnection retry policy: exponential delays with a hard attempt cap.

use std::time::Duration;

const BACKOFF_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the retry numbered `attempt` (zero based): `base * 1.5^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.base_delay.mul_f64(BACKOFF_FACTOR.powi(exponent))
    }
}

/// Outcome of recording one more connection failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Try again after `delay`; `attempt` is the zero-based retry index.
    RetryAfter { attempt: u32, delay: Duration },
    /// The cap was reached on this failure; report it once and stop.
    GiveUp,
    /// Already gave up earlier; nothing more to do until the counter is reset.
    Exhausted,
}

// Tracks consecutive failures since the last successful open.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: ReconnectPolicy,
    attempts: u32,
    gave_up: bool,
}

impl BackoffState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            gave_up: false,
        }
    }

    pub fn on_failure(&mut self) -> RetryDecision {
        if self.gave_up {
            return RetryDecision::Exhausted;
        }
        if self.attempts >= self.policy.max_attempts {
            self.gave_up = true;
            return RetryDecision::GiveUp;
        }

        let attempt = self.attempts;
        self.attempts += 1;
        RetryDecision::RetryAfter {
            attempt,
            delay: self.policy.delay_for(attempt),
        }
    }

    /// Called after a successful open or an explicit connect request.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.gave_up = false;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
