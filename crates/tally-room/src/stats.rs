//! Vote statistics derived from a room snapshot.
//!
//! Everything here is a pure function of the snapshot: the same snapshot
//! always yields the same statistics, and nothing is cached between
//! snapshots.

use std::collections::HashMap;

use serde::Serialize;
use tally_protocol::{RoomSettings, RoomSnapshot, VoteValue};

/// How many votes one option received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCount {
    pub value: VoteValue,
    pub count: usize,
}

/// Aggregate statistics for the current round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteStats {
    /// Mean of the numeric votes, rounded to one decimal. `None` when
    /// the scale isn't numeric or no numeric vote was cast.
    pub average: Option<f64>,
    /// Most common vote. Ties go to the option listed first.
    pub mode: Option<VoteValue>,
    /// Every visible option (in display order) followed by any
    /// off-scale values that were actually cast.
    pub distribution: Vec<VoteCount>,
    pub total_votes: usize,
    pub voted_users: usize,
    pub total_users: usize,
    pub judge_score: Option<VoteValue>,
    pub is_numeric_scale: bool,
}

impl VoteStats {
    /// Votes cast for `value` (0 if it isn't in the distribution).
    pub fn count_for(&self, value: &VoteValue) -> usize {
        self.distribution
            .iter()
            .find(|entry| &entry.value == value)
            .map_or(0, |entry| entry.count)
    }

    /// Returns `true` once every user in the room has voted.
    pub fn everyone_voted(&self) -> bool {
        self.total_users > 0 && self.voted_users >= self.total_users
    }

    /// Returns `true` if every cast vote is the same value.
    pub fn is_unanimous(&self) -> bool {
        self.total_votes > 0
            && self.distribution.iter().filter(|e| e.count > 0).count() == 1
    }
}

/// Returns `true` if the base scale is numeric.
///
/// Options that are also configured as extra options ("?", "coffee")
/// don't count against this; every other base option must parse as a
/// finite number, and there must be at least one base option.
pub fn is_numeric_scale(settings: &RoomSettings) -> bool {
    !settings.estimate_options.is_empty()
        && settings
            .estimate_options
            .iter()
            .filter(|option| !settings.is_extra_option(option))
            .all(|option| option.as_number().is_some())
}

/// Computes the statistics for a snapshot.
pub fn aggregate(snapshot: &RoomSnapshot) -> VoteStats {
    let settings = &snapshot.settings;
    let numeric_scale = is_numeric_scale(settings);

    // Seed with every visible option so unvoted options show up with 0.
    let mut distribution: Vec<VoteCount> = Vec::new();
    let mut index: HashMap<&VoteValue, usize> = HashMap::new();
    let visible = settings
        .estimate_options
        .iter()
        .chain(settings.enabled_extra_options());
    for option in visible {
        if !index.contains_key(option) {
            index.insert(option, distribution.len());
            distribution.push(VoteCount {
                value: option.clone(),
                count: 0,
            });
        }
    }

    let mut total_votes = 0;
    let mut numeric_sum = 0.0;
    let mut numeric_count = 0usize;
    for (_, vote) in snapshot.cast_votes() {
        total_votes += 1;
        match index.get(vote) {
            Some(&i) => distribution[i].count += 1,
            None => {
                index.insert(vote, distribution.len());
                distribution.push(VoteCount {
                    value: vote.clone(),
                    count: 1,
                });
            }
        }

        if numeric_scale && !settings.is_extra_option(vote) {
            if let Some(n) = vote.as_number() {
                numeric_sum += n;
                numeric_count += 1;
            }
        }
    }

    let average = (numeric_count > 0)
        .then(|| round_to_tenth(numeric_sum / numeric_count as f64));

    VoteStats {
        average,
        mode: mode_of(&distribution),
        distribution,
        total_votes,
        voted_users: total_votes,
        total_users: snapshot.users.len(),
        judge_score: snapshot.judge_score.clone(),
        is_numeric_scale: numeric_scale,
    }
}

// First entry with the strictly highest count wins, so ties resolve in
// distribution order.
fn mode_of(distribution: &[VoteCount]) -> Option<VoteValue> {
    let mut best: Option<&VoteCount> = None;
    for entry in distribution.iter().filter(|e| e.count > 0) {
        if best.is_none_or(|b| entry.count > b.count) {
            best = Some(entry);
        }
    }
    best.map(|entry| entry.value.clone())
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Own vote lookup
// ---------------------------------------------------------------------------

/// Maps a user to the key their vote is stored under.
///
/// In anonymous rooms vote keys are opaque, and only the client that
/// cast a vote knows which key is its own. Closures of the shape
/// `Fn(&RoomSnapshot, &str) -> Option<String>` implement this.
pub trait VoteKeyResolver {
    fn vote_key(&self, snapshot: &RoomSnapshot, user: &str) -> Option<String>;
}

impl<F> VoteKeyResolver for F
where
    F: Fn(&RoomSnapshot, &str) -> Option<String>,
{
    fn vote_key(&self, snapshot: &RoomSnapshot, user: &str) -> Option<String> {
        self(snapshot, user)
    }
}

/// Resolver for rooms where nobody can know an anonymous key.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnonymousKey;

impl VoteKeyResolver for NoAnonymousKey {
    fn vote_key(&self, _: &RoomSnapshot, _: &str) -> Option<String> {
        None
    }
}

/// The vote `user` has cast, if any.
///
/// Named rooms look the user up directly; anonymous rooms go through
/// `resolver`.
pub fn own_vote<'a>(
    snapshot: &'a RoomSnapshot,
    user: &str,
    resolver: &impl VoteKeyResolver,
) -> Option<&'a VoteValue> {
    let key = if snapshot.settings.anonymous_votes {
        resolver.vote_key(snapshot, user)?
    } else {
        user.to_string()
    };
    snapshot.votes.get(&key).and_then(Option::as_ref)
}
