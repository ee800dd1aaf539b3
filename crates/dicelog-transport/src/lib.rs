//! Transport layer for DiceLog.
//!
//! Provides the [`Connection`] trait the protocol engines talk to, a
//! length-prefixed [`FramedConnection`] that works over any async byte
//! stream, and (behind the `tls` feature) the TLS listener and dialer used
//! in production.
//!
//! Every read and write is bounded by a timeout. A timeout is reported as
//! [`TransportError::Timeout`] and should be treated as connection-fatal.
//!
//! # Feature Flags
//!
//! - `tls` (default): rustls server acceptor and pinned-certificate client

mod error;
mod framed;
#[cfg(feature = "tls")]
mod tls;

pub use error::TransportError;
pub use framed::{FramedConnection, Timeouts, MAX_MESSAGE_SIZE};
#[cfg(feature = "tls")]
pub use tls::{
    certificate_fingerprint, ClientConnection, ClientTlsConfig, Incoming,
    ServerConnection, ServerIdentity, TlsDialer, TlsListener,
};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide connection id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
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

/// A single reliable, ordered, message-oriented connection.
///
/// One message in, one message out. A connection is owned by exactly one
/// task, so every operation takes `&mut self`.
pub trait Connection: Send + 'static {
    /// Sends one message to the remote peer.
    ///
    /// Payloads longer than [`MAX_MESSAGE_SIZE`] are truncated.
    fn send(
        &mut self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Flushes pending writes and closes the connection.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Current receive timeout.
    fn read_timeout(&self) -> Duration;

    /// Current send timeout.
    fn write_timeout(&self) -> Duration;

    /// Replaces the receive timeout for subsequent reads.
    fn set_read_timeout(&mut self, timeout: Duration);

    /// Replaces the send timeout for subsequent writes.
    fn set_write_timeout(&mut self, timeout: Duration);
}
