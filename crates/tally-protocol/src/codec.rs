//! Codec trait and the JSON implementation.
//!
//! A "codec" converts between Rust types and socket frames. The
//! connection actor only depends on the [`Codec`] trait, so the wire
//! format can be swapped without touching reconnection logic.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes messages into text frames and decodes received frames.
///
/// `Send + Sync + 'static` because the codec lives inside the
/// long-running connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a received frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`), the format room servers
/// speak to browsers.
///
/// ```rust
/// use tally_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let frame = JsonCodec.encode(&ClientMessage::ShowVotes).unwrap();
/// assert_eq!(frame, r#"{"type":"showVotes"}"#);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageType, ServerMessage};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<ServerMessage, _> =
            JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_pong() {
        let msg: ServerMessage =
            JsonCodec.decode(br#"{"type":"pong"}"#).unwrap();
        assert_eq!(msg.message_type(), MessageType::Pong);
    }
}
