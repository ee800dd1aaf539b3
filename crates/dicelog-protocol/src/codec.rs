//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The engines never call `serde_json` directly. They go through a
//! [`Codec`], so the wire encoding is chosen in one place and tests can
//! exercise the engines against the exact bytes a peer would send.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec value is shared by every
/// connection task on the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed, a
    /// required field is missing, or a field has the wrong type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is the only encoding the DiceLog protocol defines. It sits behind
/// the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use dicelog_protocol::{Codec, JsonCodec, TokenMessage};
///
/// let codec = JsonCodec;
/// let msg = TokenMessage { token: "abc".into(), is_last: false };
///
/// let bytes = codec.encode(&msg).unwrap();
/// assert_eq!(bytes, br#"{"token":"abc","isLast":false}"#);
///
/// let decoded: TokenMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{AuthResponse, DiscordResponse};

    #[test]
    fn test_json_codec_decode_garbage_is_decode_error() {
        let result: Result<AuthResponse, _> = JsonCodec.decode(b"\x00\x01");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_empty_frame_is_error() {
        let result: Result<DiscordResponse, _> = JsonCodec.decode(b"");
        assert!(result.is_err());
    }

    #[test]
    fn test_json_codec_encode_produces_compact_json() {
        let bytes = JsonCodec.encode(&AuthResponse::failure()).unwrap();
        assert_eq!(bytes, br#"{"isAuthenticated":false,"token":""}"#);
    }
}
