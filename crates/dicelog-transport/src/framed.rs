//! Length-prefixed message framing over any async byte stream.
//!
//! Each message travels as a 4-byte big-endian length followed by that many
//! payload bytes. The same framing is used over TLS in production and over
//! `tokio::io::duplex` pipes in tests.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::{Connection, ConnectionId, TransportError};

/// Largest payload carried by a single frame, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Read and write deadlines for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for each receive.
    pub read: Duration,
    /// Deadline for each send (and for the TLS handshake).
    pub write: Duration,
}

impl Timeouts {
    /// Builds timeouts from millisecond values.
    pub fn from_millis(read_ms: u64, write_ms: u64) -> Self {
        Self {
            read: Duration::from_millis(read_ms),
            write: Duration::from_millis(write_ms),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_millis(5000, 5000)
    }
}

/// A [`Connection`] that frames messages with a length prefix.
pub struct FramedConnection<S> {
    id: ConnectionId,
    framed: Framed<S, LengthDelimitedCodec>,
    timeouts: Timeouts,
}

impl<S> FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps `stream` with a fresh connection id.
    pub fn new(stream: S, timeouts: Timeouts) -> Self {
        Self::with_id(stream, ConnectionId::next(), timeouts)
    }

    /// Wraps `stream` with an explicit connection id.
    pub fn with_id(stream: S, id: ConnectionId, timeouts: Timeouts) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .big_endian()
            .max_frame_length(MAX_MESSAGE_SIZE)
            .new_codec();
        Self {
            id,
            framed: Framed::new(stream, codec),
            timeouts,
        }
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.framed.get_ref()
    }
}

impl<S> Connection for FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let len = data.len().min(MAX_MESSAGE_SIZE);
        if len < data.len() {
            tracing::debug!(
                conn_id = %self.id,
                original = data.len(),
                "truncating oversized outgoing message"
            );
        }
        let frame = Bytes::copy_from_slice(&data[..len]);
        match tokio::time::timeout(self.timeouts.write, self.framed.send(frame))
            .await
        {
            Ok(result) => result.map_err(TransportError::SendFailed),
            Err(_) => Err(TransportError::Timeout { operation: "write" }),
        }
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match tokio::time::timeout(self.timeouts.read, self.framed.next()).await
        {
            Ok(Some(Ok(frame))) => Ok(Some(frame.to_vec())),
            Ok(Some(Err(e))) => Err(TransportError::ReceiveFailed(e)),
            Ok(None) => Ok(None),
            Err(_) => Err(TransportError::Timeout { operation: "read" }),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match tokio::time::timeout(
            self.timeouts.write,
            SinkExt::<Bytes>::close(&mut self.framed),
        )
        .await
        {
            Ok(result) => result.map_err(TransportError::SendFailed),
            Err(_) => Err(TransportError::Timeout { operation: "write" }),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn read_timeout(&self) -> Duration {
        self.timeouts.read
    }

    fn write_timeout(&self) -> Duration {
        self.timeouts.write
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.timeouts.read = timeout;
    }

    fn set_write_timeout(&mut self, timeout: Duration) {
        self.timeouts.write = timeout;
    }
}
