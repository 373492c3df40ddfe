//! Events published by the connection manager.

use std::fmt;
use std::time::Duration;

use tally_protocol::{MessageType, ServerMessage};
use tally_transport::ConnectionId;

use crate::Failure;

/// Routing key for [`ConnectionEvent`]s in the per-connection dispatcher.
///
/// Lifecycle events have their own keys; inbound server messages are
/// routed by their wire `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Error,
    Message(MessageType),
}

impl EventType {
    /// The lifecycle keys (everything except inbound messages).
    pub const LIFECYCLE: [EventType; 5] = [
        Self::Connecting,
        Self::Connected,
        Self::Reconnecting,
        Self::Disconnected,
        Self::Error,
    ];
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
            Self::Message(t) => write!(f, "message:{t}"),
        }
    }
}

/// Why a logical connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Every retry failed.
    Exhausted { attempts: u32 },
    /// The server rejected the identity. The caller must re-authenticate
    /// before connecting again.
    AuthFailed,
    /// The server told the client to leave.
    ServerRequested(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { attempts } => {
                write!(f, "gave up after {attempts} reconnect attempts")
            }
            Self::AuthFailed => write!(f, "authentication failed"),
            Self::ServerRequested(reason) => write!(f, "server disconnect: {reason}"),
        }
    }
}

/// Everything the connection manager tells its listeners about.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A dial is starting. `attempt` is 0 for the first dial and counts
    /// retries after that.
    Connecting { attempt: u32 },
    /// The socket is open and `join` has been sent.
    Connected { connection: ConnectionId },
    /// The socket dropped; the next dial happens after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The logical connection is over.
    Disconnected { reason: DisconnectReason },
    Error(Failure),
    /// An inbound server message.
    Message(ServerMessage),
}

impl ConnectionEvent {
    /// The dispatcher key this event is published under.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Connecting { .. } => EventType::Connecting,
            Self::Connected { .. } => EventType::Connected,
            Self::Reconnecting { .. } => EventType::Reconnecting,
            Self::Disconnected { .. } => EventType::Disconnected,
            Self::Error(_) => EventType::Error,
            Self::Message(msg) => EventType::Message(msg.message_type()),
        }
    }

    /// The server message, if this is one.
    pub fn as_message(&self) -> Option<&ServerMessage> {
        match self {
            Self::Message(msg) => Some(msg),
            _ => None,
        }
    }
}
