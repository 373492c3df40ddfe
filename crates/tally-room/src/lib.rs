//! Derived room views for Tally.
//!
//! Pure functions over a [`RoomSnapshot`](tally_protocol::RoomSnapshot):
//!
//! - [`resolve_phase`]: lobby, voting, or discussion
//! - [`aggregate`]: average, mode, distribution and participation
//! - [`own_vote`]: the viewer's own vote, including anonymous rooms
//!
//! None of these hold state. Call them again on every new snapshot.

mod phase;
mod stats;

pub use phase::{RoomPhase, resolve_phase};
pub use stats::{
    NoAnonymousKey, VoteCount, VoteKeyResolver, VoteStats, aggregate,
    is_numeric_scale, own_vote,
};
