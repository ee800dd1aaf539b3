//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means "these bytes are not the message we
//! expected" (or the value could not be serialized). It never carries a
//! transport fault; those stay in `TransportError`.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, a missing required field (including
    /// a nullable field that was omitted instead of sent as `null`), or a
    /// value of the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
