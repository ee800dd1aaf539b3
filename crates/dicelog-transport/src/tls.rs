//! TLS listener and dialer built on rustls.
//!
//! The server presents a certificate chain loaded from PEM and does not ask
//! for client certificates. The client verifies the server with the WebPKI
//! roots plus an optional extra CA; a server whose chain is merely untrusted
//! can still be accepted when its last certificate matches a pinned SHA-256
//! fingerprint.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore,
    ServerConfig, SignatureScheme,
};
use sha2::{Digest, Sha256};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::{Connection, FramedConnection, Timeouts, TransportError};

/// Server side of an established TLS connection.
pub type ServerConnection =
    FramedConnection<tokio_rustls::server::TlsStream<TcpStream>>;

/// Client side of an established TLS connection.
pub type ClientConnection =
    FramedConnection<tokio_rustls::client::TlsStream<TcpStream>>;

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Uppercase hex SHA-256 of a DER-encoded certificate.
pub fn certificate_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect()
}

/// Strips separators and case from a configured fingerprint.
fn normalize_fingerprint(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Certificate chain and private key presented by the server.
pub struct ServerIdentity {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ServerIdentity {
    /// Builds an identity from already-parsed DER material.
    pub fn from_der(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, TransportError> {
        if certs.is_empty() {
            return Err(TransportError::Certificate(
                "no certificates found".into(),
            ));
        }
        Ok(Self { certs, key })
    }

    /// Parses a PEM certificate chain and a PEM private key.
    pub fn from_pem(
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Self, TransportError> {
        let certs = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                TransportError::Certificate(format!(
                    "failed to parse certificates: {e}"
                ))
            })?;
        let key = PrivateKeyDer::from_pem_slice(key_pem).map_err(|e| {
            TransportError::Certificate(format!(
                "failed to parse private key: {e}"
            ))
        })?;
        Self::from_der(certs, key)
    }

    /// Reads the certificate chain and key from PEM files.
    pub fn from_pem_files(
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self, TransportError> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|e| {
                TransportError::Certificate(format!(
                    "{}: {e}",
                    path.display()
                ))
            })
        };
        Self::from_pem(&read(cert_path)?, &read(key_path)?)
    }

    /// Fingerprint clients should pin: the last certificate of the chain.
    pub fn fingerprint(&self) -> Option<String> {
        self.certs.last().map(|c| certificate_fingerprint(c.as_ref()))
    }
}

/// Accepts TCP connections; the TLS handshake is deferred to [`Incoming`].
pub struct TlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    timeouts: Timeouts,
}

impl TlsListener {
    /// Binds to `addr` and prepares the server TLS configuration.
    pub async fn bind(
        addr: &str,
        identity: ServerIdentity,
        timeouts: Timeouts,
    ) -> Result<Self, TransportError> {
        let config = ServerConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::TlsConfig(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(identity.certs, identity.key)
            .map_err(|e| {
                TransportError::TlsConfig(format!("server config error: {e}"))
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TLS transport listening");

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(Arc::new(config)),
            timeouts,
        })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection. Does not touch TLS.
    pub async fn accept(&self) -> Result<Incoming, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%peer, "accepted TCP connection");
        Ok(Incoming {
            stream,
            peer,
            acceptor: self.acceptor.clone(),
            timeouts: self.timeouts,
        })
    }
}

/// A TCP connection that has not yet completed its TLS handshake.
pub struct Incoming {
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    timeouts: Timeouts,
}

impl Incoming {
    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Runs the server handshake, bounded by the write timeout.
    pub async fn handshake(self) -> Result<ServerConnection, TransportError> {
        let tls = tokio::time::timeout(
            self.timeouts.write,
            self.acceptor.accept(self.stream),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            operation: "handshake",
        })?
        .map_err(TransportError::Handshake)?;

        let conn = FramedConnection::new(tls, self.timeouts);
        tracing::debug!(conn_id = %conn.id(), peer = %self.peer, "TLS established");
        Ok(conn)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// How the client authenticates the server.
#[derive(Debug, Clone, Default)]
pub struct ClientTlsConfig {
    /// Name expected in the server certificate (also sent as SNI).
    pub server_name: String,
    /// SHA-256 fingerprint accepted for otherwise untrusted chains.
    pub fingerprint: Option<String>,
    /// Extra PEM-encoded trust anchors.
    pub ca_pem: Option<Vec<u8>>,
}

/// Opens TLS connections to a single configured server.
pub struct TlsDialer {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    timeouts: Timeouts,
}

impl TlsDialer {
    /// Builds the client TLS configuration.
    pub fn new(
        config: &ClientTlsConfig,
        timeouts: Timeouts,
    ) -> Result<Self, TransportError> {
        let provider = crypto_provider();

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        if let Some(pem) = &config.ca_pem {
            for cert in CertificateDer::pem_slice_iter(pem) {
                let cert = cert.map_err(|e| {
                    TransportError::Certificate(format!(
                        "failed to parse CA certificate: {e}"
                    ))
                })?;
                roots.add(cert).map_err(|e| {
                    TransportError::Certificate(format!(
                        "failed to add CA certificate: {e}"
                    ))
                })?;
            }
        }

        let inner = WebPkiServerVerifier::builder_with_provider(
            Arc::new(roots),
            Arc::clone(&provider),
        )
        .build()
        .map_err(|e| TransportError::TlsConfig(e.to_string()))?;

        let pinned = config
            .fingerprint
            .as_deref()
            .map(normalize_fingerprint)
            .filter(|f| !f.is_empty());

        let verifier = PinnedCertVerifier { inner, pinned };

        let tls_config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::TlsConfig(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        let server_name = ServerName::try_from(config.server_name.clone())
            .map_err(|_| {
                TransportError::TlsConfig(format!(
                    "invalid server name: {}",
                    config.server_name
                ))
            })?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(tls_config)),
            server_name,
            timeouts,
        })
    }

    /// Connects to `addr` and completes the TLS handshake.
    pub async fn connect(
        &self,
        addr: &str,
    ) -> Result<ClientConnection, TransportError> {
        let stream =
            tokio::time::timeout(self.timeouts.write, TcpStream::connect(addr))
                .await
                .map_err(|_| TransportError::Timeout {
                    operation: "connect",
                })?
                .map_err(TransportError::ConnectFailed)?;

        let tls = tokio::time::timeout(
            self.timeouts.write,
            self.connector.connect(self.server_name.clone(), stream),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            operation: "handshake",
        })?
        .map_err(TransportError::Handshake)?;

        let conn = FramedConnection::new(tls, self.timeouts);
        tracing::debug!(conn_id = %conn.id(), addr, "connected to server");
        Ok(conn)
    }
}

/// WebPKI verification with a fingerprint fallback for untrusted chains.
#[derive(Debug)]
struct PinnedCertVerifier {
    inner: Arc<WebPkiServerVerifier>,
    pinned: Option<String>,
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let err = match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => return Ok(verified),
            Err(e) => e,
        };

        if !matches!(
            err,
            rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)
        ) {
            return Err(err);
        }
        let Some(pinned) = &self.pinned else {
            return Err(err);
        };

        let anchor = intermediates.last().unwrap_or(end_entity);
        if certificate_fingerprint(anchor.as_ref()) != *pinned {
            tracing::warn!("server certificate fingerprint mismatch");
            return Err(err);
        }

        // The chain check stopped at the issuer, so the name is still unchecked.
        let parsed = ParsedCertificate::try_from(end_entity)?;
        rustls::client::verify_server_name(&parsed, server_name)?;

        tracing::debug!("accepted server certificate by pinned fingerprint");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
