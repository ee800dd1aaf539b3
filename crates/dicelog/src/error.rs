//! Unified error type for DiceLog.

use dicelog_protocol::ProtocolError;
use dicelog_session::SessionError;
use dicelog_store::StoreError;
use dicelog_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// Only faults end up here. Authentication rejections and malformed
/// command payloads are protocol outcomes and travel as response values.
#[derive(Debug, thiserror::Error)]
pub enum DicelogError {
    /// A transport-level error (timeout, reset, handshake, oversize frame).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (provisioning, token issuance).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A persistence error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Local I/O failed (token file, password prompt).
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The client has no open connection.
    #[error("not connected to a server")]
    NotConnected,
}
