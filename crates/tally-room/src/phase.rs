//! Session phase of an estimation round.

use std::fmt;

use serde::Serialize;
use tally_protocol::RoomSnapshot;

/// Where the room is in the current estimation round.
///
/// ```text
/// Lobby ──(first vote)──→ Voting ──(reveal)──→ Discussion
///   ▲                                              │
///   └──────────────(reset votes)───────────────────┘
/// ```
///
/// The phase is never stored; it is recomputed from every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomPhase {
    /// Nobody has voted yet.
    Lobby,
    /// At least one vote is in, votes are hidden.
    Voting,
    /// Votes are revealed.
    Discussion,
}

impl RoomPhase {
    /// Returns `true` if participants can still change their vote
    /// without it being seen.
    pub fn accepts_hidden_votes(&self) -> bool {
        !matches!(self, Self::Discussion)
    }
}

impl fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Voting => write!(f, "voting"),
            Self::Discussion => write!(f, "discussion"),
        }
    }
}

/// Derives the phase from a snapshot.
///
/// Revealed votes always mean `Discussion`, even if every vote is null
/// (a moderator may reveal an empty round).
pub fn resolve_phase(snapshot: &RoomSnapshot) -> RoomPhase {
    if snapshot.show_votes {
        RoomPhase::Discussion
    } else if snapshot.cast_votes().next().is_some() {
        RoomPhase::Voting
    } else {
        RoomPhase::Lobby
    }
}
