//! Exponential backoff shared by every reconnecting loop.

use std::time::Duration;

use crate::config::{CeilingBehavior, DaemonConfig};

/// Stateful exponential backoff.
///
/// Each call to [`RetryPolicy::next_delay`] returns the delay to wait before the
/// next attempt: `initial`, then `initial * multiplier`, and so on. Once the
/// delay would exceed `ceiling` the policy either stays at the ceiling
/// ([`CeilingBehavior::Cap`]) or starts over from zero ([`CeilingBehavior::Reset`]).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    initial: Duration,
    multiplier: u32,
    ceiling: Duration,
    on_ceiling: CeilingBehavior,
    current: Duration,
    attempts: u32,
}

impl RetryPolicy {
    pub fn new(initial: Duration, multiplier: u32, ceiling: Duration, on_ceiling: CeilingBehavior) -> Self {
        Self {
            initial,
            multiplier,
            ceiling,
            on_ceiling,
            current: Duration::ZERO,
            attempts: 0,
        }
    }

    /// The reconnect policy configured for status daemons.
    pub fn for_daemon(config: &DaemonConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_initial_ms),
            2,
            Duration::from_millis(config.backoff_ceiling_ms),
            config.backoff_on_ceiling,
        )
    }

    /// Advance the policy and return the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);

        let next = if self.current.is_zero() {
            self.initial
        } else {
            self.current.saturating_mul(self.multiplier)
        };

        self.current = if next > self.ceiling {
            match self.on_ceiling {
                CeilingBehavior::Cap => self.ceiling,
                CeilingBehavior::Reset => Duration::ZERO,
            }
        } else {
            next
        };

        self.current
    }

    /// Forget previous failures after a successful attempt.
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
        self.attempts = 0;
    }

    /// Failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay returned by the most recent `next_delay`.
    pub fn current(&self) -> Duration {
        self.current
    }
}
