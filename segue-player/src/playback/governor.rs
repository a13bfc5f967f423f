//! Replenishment governor
//!
//! Several callbacks can notice a low queue within moments of each other
//! (position ticks, a segment ending, starvation). The producer must see at
//! most one "need more segments" signal per cooldown interval.

use std::time::{Duration, Instant};
use tracing::debug;

/// Rate limiter for outbound replenishment signals
#[derive(Debug, Clone)]
pub struct ReplenishmentGovernor {
    cooldown: Duration,
    last_signal: Option<Instant>,
}

impl ReplenishmentGovernor {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_signal: None,
        }
    }

    /// Ask for a signal at `now`
    ///
    /// Returns true when the caller should emit the signal. The cooldown
    /// restarts only on an emitted signal.
    pub fn request(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_signal {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                debug!(
                    "Replenishment suppressed, cooldown {:.1}s remaining",
                    (self.cooldown - elapsed).as_secs_f64()
                );
                return false;
            }
        }
        self.last_signal = Some(now);
        true
    }

    /// Instant of the last emitted signal
    pub fn last_signal(&self) -> Option<Instant> {
        self.last_signal
    }

    /// Forget the last signal (session teardown)
    pub fn reset(&mut self) {
        self.last_signal = None;
    }
}
