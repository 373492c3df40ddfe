//! The client's current view of a room.
//!
//! [`RoomStore`] keeps the last snapshot the server sent as an
//! `Arc<RoomSnapshot>`. Every `initialState`/`roomUpdate` replaces it
//! wholesale; a `timerUpdate` produces a new snapshot with only the timer
//! swapped. Readers clone the `Arc` and never see a half-applied update.
//!
//! Derived values (phase, stats, timer) are recomputed from the snapshot
//! on demand; nothing derived is cached.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use tally_protocol::{RoomSnapshot, ServerMessage, VoteValue};
use tally_room::{RoomPhase, VoteKeyResolver, VoteStats, aggregate, own_vote, resolve_phase};
use tally_timer::{Clock, TimerView};

/// Holds the latest room snapshot for one connection.
///
/// Each join opens a new session (an epoch). Updates tagged with an
/// older epoch are dropped, so a listener from a torn-down connection
/// can't write into the next room's view.
#[derive(Debug, Default)]
pub struct RoomStore {
    current: RwLock<Slot>,
}

#[derive(Debug, Default)]
struct Slot {
    epoch: u64,
    room: Option<Arc<RoomSnapshot>>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an inbound server message. Returns `true` if the snapshot
    /// changed.
    ///
    /// A `timerUpdate` before any room snapshot is dropped; there is no
    /// room to attach it to.
    pub fn apply(&self, message: &ServerMessage) -> bool {
        let mut slot = self.write();
        Self::apply_to(&mut slot, message)
    }

    /// Like [`apply`](Self::apply), but only while `epoch` is still the
    /// current session.
    pub(crate) fn apply_in(&self, epoch: u64, message: &ServerMessage) -> bool {
        let mut slot = self.write();
        if slot.epoch != epoch {
            tracing::debug!(epoch, current = slot.epoch, "dropping update from a previous session");
            return false;
        }
        Self::apply_to(&mut slot, message)
    }

    /// Clears the snapshot and starts a new session. Returns its epoch.
    pub(crate) fn begin_session(&self) -> u64 {
        let mut slot = self.write();
        slot.epoch = slot.epoch.wrapping_add(1);
        slot.room = None;
        slot.epoch
    }

    /// The current snapshot, if one has arrived.
    pub fn snapshot(&self) -> Option<Arc<RoomSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .room
            .clone()
    }

    /// Forgets the current snapshot (e.g. after leaving the room).
    ///
    /// Also ends the session: late updates from it are ignored.
    pub fn clear(&self) {
        self.begin_session();
    }

    pub fn phase(&self) -> Option<RoomPhase> {
        self.snapshot().map(|room| resolve_phase(&room))
    }

    pub fn stats(&self) -> Option<VoteStats> {
        self.snapshot().map(|room| aggregate(&room))
    }

    /// The timer at the clock's current time. `None` without a snapshot
    /// or when the room has no timer.
    pub fn timer(&self, clock: &impl Clock) -> Option<TimerView> {
        let room = self.snapshot()?;
        room.timer_state
            .as_ref()
            .map(|state| TimerView::now(state, clock))
    }

    /// The vote `user` has cast in the current snapshot.
    pub fn own_vote(&self, user: &str, resolver: &impl VoteKeyResolver) -> Option<VoteValue> {
        let room = self.snapshot()?;
        own_vote(&room, user, resolver).cloned()
    }

    /// Everything derived from the current snapshot at one instant.
    pub fn view(&self, clock: &impl Clock) -> Option<RoomView> {
        let room = self.snapshot()?;
        Some(RoomView::derive(room, clock.now_ms()))
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Runs under the write lock, so a timer swap can't interleave with a
    // full replacement.
    fn apply_to(slot: &mut Slot, message: &ServerMessage) -> bool {
        match message {
            ServerMessage::InitialState { room } | ServerMessage::RoomUpdate { room } => {
                tracing::debug!(
                    room = %room.key,
                    users = room.users.len(),
                    show_votes = room.show_votes,
                    "room snapshot replaced"
                );
                slot.room = Some(Arc::new(RoomSnapshot::clone(room)));
                true
            }
            ServerMessage::TimerUpdate { timer_state } => {
                let Some(current) = slot.room.as_ref() else {
                    tracing::debug!("timer update before first snapshot, ignoring");
                    return false;
                };
                let mut next = RoomSnapshot::clone(current);
                next.timer_state = Some(*timer_state);
                slot.room = Some(Arc::new(next));
                true
            }
            _ => false,
        }
    }
}

/// A snapshot together with the values derived from it.
#[derive(Debug, Clone)]
pub struct RoomView {
    pub room: Arc<RoomSnapshot>,
    pub phase: RoomPhase,
    pub stats: VoteStats,
    pub timer: Option<TimerView>,
}

impl RoomView {
    pub fn derive(room: Arc<RoomSnapshot>, now_ms: i64) -> Self {
        let phase = resolve_phase(&room);
        let stats = aggregate(&room);
        let timer = room
            .timer_state
            .as_ref()
            .map(|state| TimerView::at(state, now_ms));
        Self {
            room,
            phase,
            stats,
            timer,
        }
    }
}
