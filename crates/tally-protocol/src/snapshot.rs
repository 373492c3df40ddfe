//! Room snapshot types: the complete room state pushed by the server.
//!
//! A snapshot is never patched. Every `initialState` / `roomUpdate`
//! carries a full replacement, and consumers swap the whole value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{ExternalService, VoteValue};

// ---------------------------------------------------------------------------
// RoomSnapshot
// ---------------------------------------------------------------------------

/// Complete, immutable description of a room at one point in time.
///
/// Every field except `key` is defaulted during deserialization, so a
/// minimal payload like `{"key":"abc"}` is a valid (empty) room.
///
/// Vote map keys are user names, or opaque per-user keys when
/// `settings.anonymous_votes` is set. Both vote maps keep the order the
/// server sent them in; vote statistics break ties in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Room key (also the path segment of the room URL).
    pub key: String,

    /// Users currently in the room, in join order.
    #[serde(default)]
    pub users: Vec<String>,

    /// User (or anonymous key) → cast vote. `None` = joined, not voted.
    #[serde(default)]
    pub votes: IndexMap<String, Option<VoteValue>>,

    /// User (or anonymous key) → multi-field vote for richer scales.
    #[serde(default)]
    pub structured_votes: IndexMap<String, StructuredVote>,

    /// Whether cast votes are visible to participants.
    #[serde(default)]
    pub show_votes: bool,

    /// User name of the current moderator, if any.
    #[serde(default)]
    pub moderator: Option<String>,

    #[serde(default)]
    pub settings: RoomSettings,

    #[serde(default)]
    pub ticket_queue: Vec<TicketQueueItem>,

    /// Externally supplied authoritative estimate for the round.
    #[serde(default)]
    pub judge_score: Option<VoteValue>,

    #[serde(default)]
    pub timer_state: Option<TimerState>,
}

impl RoomSnapshot {
    /// Creates an empty room with default settings.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            users: Vec::new(),
            votes: IndexMap::new(),
            structured_votes: IndexMap::new(),
            show_votes: false,
            moderator: None,
            settings: RoomSettings::default(),
            ticket_queue: Vec::new(),
            judge_score: None,
            timer_state: None,
        }
    }

    /// Iterates over votes that have actually been cast (non-null).
    pub fn cast_votes(&self) -> impl Iterator<Item = (&str, &VoteValue)> {
        self.votes
            .iter()
            .filter_map(|(user, vote)| vote.as_ref().map(|v| (user.as_str(), v)))
    }

    /// Returns `true` if `user` is the room's moderator.
    pub fn is_moderator(&self, user: &str) -> bool {
        self.moderator.as_deref() == Some(user)
    }

    /// The ticket currently being estimated (head of the queue).
    pub fn current_ticket(&self) -> Option<&TicketQueueItem> {
        self.ticket_queue.first()
    }
}

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// The estimation scale used when a room doesn't configure one.
const DEFAULT_ESTIMATE_OPTIONS: [&str; 7] = ["1", "2", "3", "5", "8", "13", "21"];

fn default_estimate_options() -> Vec<VoteValue> {
    DEFAULT_ESTIMATE_OPTIONS.iter().map(|o| VoteValue::new(*o)).collect()
}

/// Per-room configuration chosen by the moderator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// The base scale, in display order.
    #[serde(default = "default_estimate_options")]
    pub estimate_options: Vec<VoteValue>,

    /// Non-numeric marker options ("?", "coffee") shown next to the scale.
    #[serde(default)]
    pub extra_vote_options: Vec<ExtraVoteOption>,

    #[serde(default)]
    pub anonymous_votes: bool,

    #[serde(default)]
    pub external_service: ExternalService,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            estimate_options: default_estimate_options(),
            extra_vote_options: Vec::new(),
            anonymous_votes: false,
            external_service: ExternalService::None,
        }
    }
}

impl RoomSettings {
    /// Returns `true` if `value` is one of the configured extra options
    /// (enabled or not). Extra options never count towards the average.
    pub fn is_extra_option(&self, value: &VoteValue) -> bool {
        self.extra_vote_options.iter().any(|o| &o.value == value)
    }

    /// Extra options currently offered to voters.
    pub fn enabled_extra_options(&self) -> impl Iterator<Item = &VoteValue> {
        self.extra_vote_options
            .iter()
            .filter(|o| o.enabled)
            .map(|o| &o.value)
    }
}

/// A non-numeric vote option such as `"?"` or `"coffee"`.
///
/// Accepts either a bare string or `{ "value", "label", "enabled" }` on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawExtraVoteOption")]
pub struct ExtraVoteOption {
    pub value: VoteValue,
    pub label: Option<String>,
    pub enabled: bool,
}

impl ExtraVoteOption {
    /// An enabled option without a label.
    pub fn new(value: impl Into<VoteValue>) -> Self {
        Self {
            value: value.into(),
            label: None,
            enabled: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExtraVoteOption {
    Plain(VoteValue),
    Full {
        value: VoteValue,
        #[serde(default)]
        label: Option<String>,
        #[serde(default = "enabled_by_default")]
        enabled: bool,
    },
}

fn enabled_by_default() -> bool {
    true
}

impl From<RawExtraVoteOption> for ExtraVoteOption {
    fn from(raw: RawExtraVoteOption) -> Self {
        match raw {
            RawExtraVoteOption::Plain(value) => Self::new(value),
            RawExtraVoteOption::Full {
                value,
                label,
                enabled,
            } => Self {
                value,
                label,
                enabled,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// StructuredVote / TicketQueueItem
// ---------------------------------------------------------------------------

/// A multi-field vote (e.g. complexity + confidence + unknowns) used by
/// richer estimation scales. Fields are kept as raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredVote {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StructuredVote {
    /// Looks up a single field.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }
}

/// One entry of the room's ticket queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketQueueItem {
    #[serde(default)]
    pub id: String,
    /// Tracker key, e.g. `PROJ-42`.
    #[serde(default)]
    pub ticket_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Final estimate once the ticket has been completed.
    #[serde(default)]
    pub outcome: Option<VoteValue>,
}

// ---------------------------------------------------------------------------
// TimerState
// ---------------------------------------------------------------------------

/// Server-owned round timer, as of the last update the server issued.
///
/// The client never ticks this value itself. It re-derives live seconds
/// from `seconds` plus the time elapsed since `last_update_time`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    #[serde(default)]
    pub running: bool,
    /// Seconds on the clock when the server issued this state.
    #[serde(default)]
    pub seconds: u64,
    /// Server timestamp (epoch ms) of this update.
    #[serde(default)]
    pub last_update_time: i64,
    /// Timer value at the start of the current countdown round.
    #[serde(default)]
    pub round_anchor_seconds: u64,
    #[serde(default)]
    pub target_duration_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_snapshot_resolves_defaults() {
        let snapshot: RoomSnapshot =
            serde_json::from_str(r#"{"key":"abc"}"#).unwrap();

        assert_eq!(snapshot.key, "abc");
        assert!(snapshot.users.is_empty());
        assert!(snapshot.votes.is_empty());
        assert!(!snapshot.show_votes);
        assert_eq!(snapshot.settings, RoomSettings::default());
        assert!(snapshot.timer_state.is_none());
    }

    #[test]
    fn test_vote_maps_keep_wire_order() {
        let json = r#"{
            "key": "r",
            "votes": { "zed": "40", "amy": "100", "mia": null },
            "structuredVotes": { "zed": {}, "amy": {} }
        }"#;
        let snapshot: RoomSnapshot = serde_json::from_str(json).unwrap();

        let users: Vec<&str> = snapshot.votes.keys().map(String::as_str).collect();
        assert_eq!(users, ["zed", "amy", "mia"]);
        let cast: Vec<&str> = snapshot.cast_votes().map(|(user, _)| user).collect();
        assert_eq!(cast, ["zed", "amy"]);
        let structured: Vec<&str> =
            snapshot.structured_votes.keys().map(String::as_str).collect();
        assert_eq!(structured, ["zed", "amy"]);
    }

    #[test]
    fn test_full_snapshot_payload() {
        let json = r#"{
            "key": "sprint-12",
            "users": ["alice", "bob", "carol"],
            "votes": { "alice": "5", "bob": 8, "carol": null },
            "structuredVotes": { "alice": { "complexity": 3, "confidence": "high" } },
            "showVotes": true,
            "moderator": "alice",
            "settings": {
                "estimateOptions": [1, 2, 3, 5, 8],
                "extraVoteOptions": ["?", { "value": "coffee", "enabled": false }],
                "anonymousVotes": false,
                "externalService": "jira"
            },
            "ticketQueue": [{ "id": "t1", "ticketId": "PROJ-1", "title": "Login" }],
            "judgeScore": 5,
            "timerState": {
                "running": true,
                "seconds": 42,
                "lastUpdateTime": 1700000000000,
                "roundAnchorSeconds": 30,
                "targetDurationSeconds": 120
            }
        }"#;
        let snapshot: RoomSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.users.len(), 3);
        assert_eq!(snapshot.votes["bob"], Some(VoteValue::new("8")));
        assert_eq!(snapshot.votes["carol"], None);
        assert_eq!(snapshot.cast_votes().count(), 2);
        assert!(snapshot.is_moderator("alice"));
        assert_eq!(snapshot.settings.external_service, ExternalService::Jira);
        assert_eq!(snapshot.settings.extra_vote_options.len(), 2);
        assert!(!snapshot.settings.extra_vote_options[1].enabled);
        assert_eq!(
            snapshot.settings.enabled_extra_options().collect::<Vec<_>>(),
            vec![&VoteValue::new("?")]
        );
        assert_eq!(
            snapshot.structured_votes["alice"].get("complexity"),
            Some(&serde_json::json!(3))
        );
        assert_eq!(snapshot.current_ticket().unwrap().ticket_id, "PROJ-1");
        assert_eq!(snapshot.judge_score, Some(VoteValue::new("5")));

        let timer = snapshot.timer_state.unwrap();
        assert!(timer.running);
        assert_eq!(timer.round_anchor_seconds, 30);
        assert_eq!(timer.target_duration_seconds, Some(120));
    }

    #[test]
    fn test_settings_default_scale_is_fibonacci() {
        let settings = RoomSettings::default();
        let scale: Vec<&str> =
            settings.estimate_options.iter().map(|o| o.as_str()).collect();
        assert_eq!(scale, DEFAULT_ESTIMATE_OPTIONS);
    }

    #[test]
    fn test_is_extra_option_includes_disabled() {
        let settings = RoomSettings {
            extra_vote_options: vec![ExtraVoteOption {
                value: VoteValue::new("?"),
                label: None,
                enabled: false,
            }],
            ..RoomSettings::default()
        };
        assert!(settings.is_extra_option(&VoteValue::new("?")));
        assert!(!settings.is_extra_option(&VoteValue::new("5")));
    }

    #[test]
    fn test_snapshot_missing_key_is_rejected() {
        let result: Result<RoomSnapshot, _> = serde_json::from_str(r#"{"users":[]}"#);
        assert!(result.is_err());
    }
}
