//! Client transport abstraction for Tally.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! how a client reaches a room server. The connection manager only ever
//! talks to these traits, so tests can script connections without a
//! network.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket connector via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Close code and reason sent by the peer when it closed the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Numeric close code (1000 = normal, 1006 = abnormal, 4xxx = app).
    pub code: u16,
    /// Human-readable reason, possibly empty.
    pub reason: String,
}

impl CloseInfo {
    /// Creates a close info from a code and reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// One item read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text or binary data frame.
    Data(Vec<u8>),
    /// The peer closed the connection. `None` when the stream ended
    /// without a close frame (abnormal closure).
    Closed(Option<CloseInfo>),
}

/// Opens outgoing connections to a room server.
///
/// Methods return `Send` futures so the connection actor can be spawned
/// on a multi-threaded runtime.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a new connection to `url`.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single open connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// Sends a text frame to the remote peer.
    fn send(
        &self,
        text: String,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next item from the remote peer.
    ///
    /// Must be cancel-safe: the connection actor drops this future
    /// whenever another `select!` branch wins.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Incoming, TransportError>> + Send;

    /// Closes the connection with a normal close frame.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
