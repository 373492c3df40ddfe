//! Unified error type for the Tally client.

use tally_auth::IntegrationError;
use tally_connection::ConnectionError;
use tally_protocol::ProtocolError;
use tally_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    /// A transport-level error (dial, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame couldn't be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The room connection isn't in a state to do this.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// An issue-tracker call or token refresh failed.
    #[error(transparent)]
    Integration(#[from] IntegrationError),

    /// The client builder was missing a required setting.
    #[error("invalid client configuration: {0}")]
    Config(String),
}
