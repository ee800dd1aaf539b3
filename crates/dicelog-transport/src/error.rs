/// Errors that can occur in the transport layer.
///
/// Every variant is connection-fatal: the owning task should stop using the
/// connection once one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed, including frames above the size limit.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Opening an outbound TCP connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The TLS handshake did not complete.
    #[error("tls handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    /// A read or write did not finish within its timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// Which operation expired (`read`, `write`, `handshake`, `connect`).
        operation: &'static str,
    },

    /// TLS configuration could not be built.
    #[error("tls configuration: {0}")]
    TlsConfig(String),

    /// Certificate or key material could not be loaded.
    #[error("certificate: {0}")]
    Certificate(String),
}
