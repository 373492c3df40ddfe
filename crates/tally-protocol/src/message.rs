//! Socket messages exchanged between a Tally client and a room server.
//!
//! Every frame is a JSON object with a `type` field:
//!
//! ```text
//! { "type": "roomUpdate", "room": { "key": "abc", ... } }
//! { "type": "error", "reason": "auth", "closeCode": 4001, "message": "..." }
//! ```
//!
//! Inbound types this client doesn't know decode to
//! [`ServerMessage::Unknown`] instead of failing, so a newer server can
//! add message types without breaking older clients.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{RoomSnapshot, StructuredVote, TimerState, VoteValue};

/// Close code a room server uses when it rejects the client's identity.
/// A close with this code is terminal: reconnecting can't fix it.
pub const AUTH_FAILURE_CLOSE_CODE: u16 = 4001;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Messages the room server sends to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// The server accepted the join.
    Connected,

    /// The server is ending the session.
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },

    /// Something went wrong on the server side.
    Error(ErrorPayload),

    /// Full room state sent right after joining.
    InitialState { room: Box<RoomSnapshot> },

    /// Full replacement room state after any change.
    RoomUpdate { room: Box<RoomSnapshot> },

    /// Timer-only update (cheaper than a full room update).
    TimerUpdate {
        #[serde(rename = "timerState")]
        timer_state: TimerState,
    },

    /// Reply to [`ClientMessage::Ping`].
    Pong,

    /// Any `type` this client doesn't recognize.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// The routing key used by the event dispatcher.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Connected => MessageType::Connected,
            Self::Disconnected { .. } => MessageType::Disconnected,
            Self::Error(_) => MessageType::Error,
            Self::InitialState { .. } => MessageType::InitialState,
            Self::RoomUpdate { .. } => MessageType::RoomUpdate,
            Self::TimerUpdate { .. } => MessageType::TimerUpdate,
            Self::Pong => MessageType::Pong,
            Self::Unknown => MessageType::Unknown,
        }
    }

    /// The room snapshot carried by this message, if any.
    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        match self {
            Self::InitialState { room } | Self::RoomUpdate { room } => Some(&**room),
            _ => None,
        }
    }
}

/// Payload of an inbound `error` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default)]
    pub reason: Option<ErrorReason>,
    #[serde(default)]
    pub close_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorPayload {
    /// Returns `true` if the server rejected the client's identity,
    /// either by reason marker or by the reserved close code.
    pub fn is_auth_failure(&self) -> bool {
        self.reason == Some(ErrorReason::Auth)
            || self.close_code == Some(AUTH_FAILURE_CLOSE_CODE)
    }

    /// Returns `true` if the server is asking the client to go away.
    pub fn is_disconnect(&self) -> bool {
        self.reason == Some(ErrorReason::Disconnect)
    }

    /// Best available human-readable description.
    pub fn description(&self) -> &str {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("unknown server error")
    }
}

/// Machine-readable category attached to an inbound error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorReason {
    Auth,
    Disconnect,
    #[serde(other)]
    Other,
}

/// Routing key for inbound messages (the value of the `type` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Connected,
    Disconnected,
    Error,
    InitialState,
    RoomUpdate,
    TimerUpdate,
    Pong,
    Unknown,
}

impl MessageType {
    /// Every inbound message type, for listeners that want all of them.
    pub const ALL: [MessageType; 8] = [
        Self::Connected,
        Self::Disconnected,
        Self::Error,
        Self::InitialState,
        Self::RoomUpdate,
        Self::TimerUpdate,
        Self::Pong,
        Self::Unknown,
    ];

    /// The wire name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::InitialState => "initialState",
            Self::RoomUpdate => "roomUpdate",
            Self::TimerUpdate => "timerUpdate",
            Self::Pong => "pong",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Messages the client sends to the room server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// First frame on every (re)opened socket: who we are.
    Join {
        #[serde(rename = "userName")]
        user_name: String,
        #[serde(
            rename = "authToken",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        auth_token: Option<String>,
    },

    /// Cast (or with `None`, retract) a vote.
    Vote {
        value: Option<VoteValue>,
        #[serde(
            rename = "structuredVote",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        structured_vote: Option<StructuredVote>,
    },

    ShowVotes,
    ResetVotes,
    NextTicket,
    StartTimer,
    PauseTimer,
    ResetTimer,
    Ping,
}
