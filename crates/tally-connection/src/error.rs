//! Error types for the connection layer.

use std::fmt;

use tally_protocol::ProtocolError;

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// There is no open connection to send on (never connected, still
    /// connecting, reconnecting, or closed).
    #[error("not connected to a room")]
    NotConnected,

    /// An outbound message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The room key is blank, `.` or `..`.
    #[error("invalid room key {0:?}")]
    InvalidRoomKey(String),

    /// `server_url` isn't an absolute URL that can carry a path.
    #[error("invalid server url {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: String },
}

/// Category of a reported connection failure.
///
/// Only `Network` failures are retried. `Auth` and `Server` end the
/// logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Dropped socket, refused dial, abnormal close. Retried.
    Network,
    /// The server rejected the client's identity. Never retried; the
    /// caller must re-authenticate.
    Auth,
    /// The server asked the client to leave.
    Server,
    /// An inbound frame couldn't be decoded. Reported, then skipped;
    /// the connection stays up.
    Protocol,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Auth => write!(f, "auth"),
            Self::Server => write!(f, "server"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

/// A failure reported through the `error` lifecycle event.
///
/// Unlike [`ConnectionError`] this is `Clone`, because the same event is
/// delivered to every listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// WebSocket close code, when the failure came from a close frame.
    pub close_code: Option<u16>,
}

impl Failure {
    /// A retryable network failure.
    pub fn network(message: impl Into<String>, close_code: Option<u16>) -> Self {
        Self {
            kind: FailureKind::Network,
            message: message.into(),
            close_code,
        }
    }

    /// A terminal authentication failure.
    pub fn auth(message: impl Into<String>, close_code: Option<u16>) -> Self {
        Self {
            kind: FailureKind::Auth,
            message: message.into(),
            close_code,
        }
    }

    /// A terminal server-requested disconnect.
    pub fn server(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Server,
            message: message.into(),
            close_code: None,
        }
    }

    /// A malformed inbound frame.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Protocol,
            message: message.into(),
            close_code: None,
        }
    }

    /// Returns `true` if the connection manager will retry after this.
    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Network
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.close_code {
            Some(code) => write!(f, "{} failure ({code}): {}", self.kind, self.message),
            None => write!(f, "{} failure: {}", self.kind, self.message),
        }
    }
}
