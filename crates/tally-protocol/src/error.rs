//! Error types for the protocol layer.
//!
//! Each crate in Tally defines its own error enum. When you see a
//! `ProtocolError`, the problem is in turning frames into messages (or
//! back), not in networking or room logic.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into a text frame).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning a frame into a Rust type).
    ///
    /// Common causes: malformed JSON, missing `type`, or a known `type`
    /// with fields of the wrong shape.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
