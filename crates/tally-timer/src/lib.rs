//! Round timer reconciliation for Tally.
//!
//! The room server owns the timer. Clients never count seconds
//! themselves; each [`TimerState`] the server sends is an *anchor*
//! (`seconds` at server time `last_update_time`), and the live value is
//! re-derived from it on demand:
//!
//! ```text
//! current   = running ? seconds + floor((now − last_update_time) / 1000)
//!                     : seconds
//! elapsed   = max(0, current − round_anchor_seconds)
//! remaining = max(0, target − elapsed)
//! ```
//!
//! Client and server clocks are not synchronized. A client clock behind
//! the server produces a negative delta, which is clamped to 0 rather
//! than running the timer backwards.
//!
//! # Integration
//!
//! A UI that wants to redraw once per second can drive a
//! [`TimerTicker`] from its `tokio::select!` loop:
//!
//! ```ignore
//! let mut ticker = TimerTicker::every_second();
//! loop {
//!     tokio::select! {
//!         Some(update) = updates.recv() => state = update,
//!         view = ticker.tick(&state, &SystemClock) => render(view),
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tally_protocol::TimerState;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Round length used when the room doesn't configure one.
pub const DEFAULT_TARGET_DURATION_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_millis()).unwrap_or(i64::MAX),
            // Clock set before 1970; report it as negative epoch time.
            Err(err) => -i64::try_from(err.duration().as_millis()).unwrap_or(i64::MAX),
        }
    }
}

/// A manually controlled clock for tests and replays.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ms: AtomicI64,
}

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Live timer value at `now_ms`.
///
/// A stopped timer is frozen at its stored value no matter how much time
/// has passed.
pub fn current_seconds(state: &TimerState, now_ms: i64) -> u64 {
    if !state.running {
        return state.seconds;
    }
    let delta_ms = now_ms.saturating_sub(state.last_update_time).max(0);
    // Non-negative, so integer division is floor.
    let delta_secs = u64::try_from(delta_ms / 1_000).unwrap_or(0);
    state.seconds.saturating_add(delta_secs)
}

/// The configured round length, or [`DEFAULT_TARGET_DURATION_SECS`].
///
/// A target of 0 counts as unset.
pub fn target_duration_seconds(state: &TimerState) -> u64 {
    state
        .target_duration_seconds
        .filter(|&target| target > 0)
        .unwrap_or(DEFAULT_TARGET_DURATION_SECS)
}

/// Seconds spent in the current round.
pub fn elapsed_since_anchor(state: &TimerState, now_ms: i64) -> u64 {
    current_seconds(state, now_ms).saturating_sub(state.round_anchor_seconds)
}

/// Seconds left in the current round. Never negative.
pub fn remaining_seconds(state: &TimerState, now_ms: i64) -> u64 {
    target_duration_seconds(state).saturating_sub(elapsed_since_anchor(state, now_ms))
}

// ---------------------------------------------------------------------------
// TimerView
// ---------------------------------------------------------------------------

/// Every derived timer value at one instant, ready to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub running: bool,
    pub current_seconds: u64,
    pub target_seconds: u64,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    /// The round has run past its target.
    pub is_overtime: bool,
}

impl TimerView {
    pub fn at(state: &TimerState, now_ms: i64) -> Self {
        let target = target_duration_seconds(state);
        let elapsed = elapsed_since_anchor(state, now_ms);
        Self {
            running: state.running,
            current_seconds: current_seconds(state, now_ms),
            target_seconds: target,
            elapsed_seconds: elapsed,
            remaining_seconds: target.saturating_sub(elapsed),
            is_overtime: elapsed > target,
        }
    }

    /// Shorthand for [`TimerView::at`] with the clock's current time.
    pub fn now(state: &TimerState, clock: &impl Clock) -> Self {
        Self::at(state, clock.now_ms())
    }

    /// Remaining time as `mm:ss`.
    pub fn remaining_clock(&self) -> String {
        format_clock(self.remaining_seconds)
    }

    /// Elapsed time as `mm:ss`.
    pub fn elapsed_clock(&self) -> String {
        format_clock(self.elapsed_seconds)
    }
}

/// Formats seconds as `mm:ss`. Minutes are not wrapped into hours.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

// ---------------------------------------------------------------------------
// TimerTicker
// ---------------------------------------------------------------------------

/// Periodic redraw signal for a live timer display.
///
/// Each tick re-derives a fresh [`TimerView`] from the latest state, so
/// the display never drifts from the server anchor. Missed ticks (a busy
/// UI task) are skipped, not replayed.
#[derive(Debug)]
pub struct TimerTicker {
    interval: Interval,
}

impl TimerTicker {
    /// Shortest allowed period; anything faster is pointless for a
    /// seconds display.
    pub const MIN_PERIOD: Duration = Duration::from_millis(50);

    /// Must be called inside a Tokio runtime.
    pub fn new(period: Duration) -> Self {
        let period = if period < Self::MIN_PERIOD {
            tracing::warn!(?period, min = ?Self::MIN_PERIOD, "timer period too short, clamping");
            Self::MIN_PERIOD
        } else {
            period
        };
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    pub fn every_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Waits for the next tick and returns the view at that moment.
    ///
    /// The first tick completes immediately. Cancel-safe.
    pub async fn tick(&mut self, state: &TimerState, clock: &impl Clock) -> TimerView {
        self.interval.tick().await;
        let view = TimerView::now(state, clock);
        tracing::trace!(
            current = view.current_seconds,
            remaining = view.remaining_seconds,
            "timer tick"
        );
        view
    }
}
