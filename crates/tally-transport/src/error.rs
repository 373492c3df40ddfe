/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed (DNS, TCP, TLS or HTTP upgrade).
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The server refused the upgrade with an HTTP status.
    ///
    /// A 401/403 here means the credentials were rejected before the
    /// socket ever opened.
    #[error("upgrade rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Returns `true` if the remote end rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403 })
    }
}
