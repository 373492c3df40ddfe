//! Reconnect backoff.
//!
//! Each retry waits `base · 2^attempts · jitter`, capped at `max`, with
//! jitter drawn uniformly from `[0.85, 1.15]` so a room full of clients
//! that lost the server at the same instant don't all come back at once.

use std::time::Duration;

use rand::Rng;

use crate::ReconnectConfig;

/// Lowest jitter factor applied to a computed delay.
pub const JITTER_MIN: f64 = 0.85;
/// Highest jitter factor applied to a computed delay.
pub const JITTER_MAX: f64 = 1.15;

/// Retry bookkeeping for one logical connection.
///
/// Owned exclusively by the connection actor. `attempts` goes back to 0
/// every time a socket opens successfully.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ReconnectState {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    /// Retries scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` while another retry is allowed.
    pub fn should_reconnect(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// The delay for the next retry, with fresh random jitter.
    ///
    /// Does not advance the counter; call [`record_attempt`] once the
    /// retry is actually scheduled.
    ///
    /// [`record_attempt`]: Self::record_attempt
    pub fn next_delay(&self) -> Duration {
        let jitter = rand::rng().random_range(JITTER_MIN..=JITTER_MAX);
        self.delay_for(self.attempts, jitter)
    }

    /// The delay for a given attempt number and jitter factor.
    ///
    /// Deterministic; `next_delay` is this with a random jitter.
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        // powi saturates to infinity for absurd attempt counts, and
        // min() then lands on max_ms.
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = (base_ms * 2f64.powi(exponent) * jitter).min(max_ms);
        Duration::from_millis(delay_ms.round() as u64)
    }

    /// Counts a scheduled retry.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Forgets all previous failures (called on every successful open).
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
