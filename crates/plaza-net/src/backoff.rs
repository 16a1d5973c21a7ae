//! Bounded exponential backoff for reconnects and send retries.

use std::time::Duration;

/// Backoff schedule: `initial * multiplier^attempt`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub multiplier: f32,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0 for the first retry).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial.as_millis() as f32;
        let multiplier = self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis((base * multiplier) as u64);

        if delay > self.max {
            self.max
        } else {
            delay
        }
    }
}
