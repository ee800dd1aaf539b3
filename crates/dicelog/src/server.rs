//! `DicelogServer` builder and server loop.
//!
//! This is the entry point for running a DiceLog server. It ties together
//! all the layers: transport → protocol → session → executor.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dicelog_protocol::JsonCodec;
use dicelog_session::{
    Clock, CredentialStore, SessionAuthenticator, SystemClock,
};
use dicelog_store::{HistoryStore, SqliteStore};
use dicelog_transport::{ServerIdentity, Timeouts, TlsListener};

use crate::config::{ConfigError, ServerConfig};
use crate::dice::DiceExecutor;
use crate::handler::handle_connection;
use crate::{CommandExecutor, DicelogError};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Nothing in
/// here is mutated per connection; connection binding lives in the task.
pub(crate) struct ServerState<S, H, E, K = SystemClock> {
    pub(crate) auth: Arc<SessionAuthenticator<S, K>>,
    pub(crate) history: Arc<H>,
    pub(crate) executor: E,
    pub(crate) codec: JsonCodec,
    pub(crate) auth_extension: Duration,
}

impl<S, H, E, K> ServerState<S, H, E, K> {
    pub(crate) fn new(
        auth: Arc<SessionAuthenticator<S, K>>,
        history: Arc<H>,
        executor: E,
        auth_extension: Duration,
    ) -> Self {
        Self {
            auth,
            history,
            executor,
            codec: JsonCodec,
            auth_extension,
        }
    }
}

/// The server wired up from a [`ServerConfig`]: SQLite for credentials and
/// history, dice for commands.
pub type SqliteDicelogServer =
    DicelogServer<SqliteStore, SqliteStore, DiceExecutor<SqliteStore>>;

/// Builder for configuring and starting a DiceLog server.
///
/// # Example
///
/// ```rust,ignore
/// use dicelog::prelude::*;
///
/// let server = DicelogServerBuilder::new()
///     .bind("0.0.0.0:50023")
///     .identity(ServerIdentity::from_pem_files(&cert, &key)?)
///     .build(auth, history, executor)
///     .await?;
/// server.run().await
/// ```
pub struct DicelogServerBuilder {
    bind_addr: String,
    timeouts: Timeouts,
    auth_extension: Duration,
    identity: Option<ServerIdentity>,
}

impl DicelogServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind_addr: defaults.bind_addr.clone(),
            timeouts: defaults.timeouts(),
            auth_extension: defaults.auth_extension(),
            identity: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the per-message read and write deadlines.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets the extra read time granted while a client logs in.
    pub fn auth_extension(mut self, extension: Duration) -> Self {
        self.auth_extension = extension;
        self
    }

    /// Sets the certificate and key presented to clients.
    pub fn identity(mut self, identity: ServerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Binds the listener and assembles the shared state.
    ///
    /// # Errors
    /// Fails if no identity was set or the listener cannot bind.
    pub async fn build<S, H, E, K>(
        self,
        auth: Arc<SessionAuthenticator<S, K>>,
        history: Arc<H>,
        executor: E,
    ) -> Result<DicelogServer<S, H, E, K>, DicelogError>
    where
        S: CredentialStore,
        H: HistoryStore,
        E: CommandExecutor,
        K: Clock,
    {
        let identity = self.identity.ok_or_else(|| {
            ConfigError::Validation("server certificate not configured".into())
        })?;
        let listener =
            TlsListener::bind(&self.bind_addr, identity, self.timeouts).await?;

        let state = Arc::new(ServerState::new(
            auth,
            history,
            executor,
            self.auth_extension,
        ));

        Ok(DicelogServer { listener, state })
    }
}

impl Default for DicelogServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running DiceLog server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DicelogServer<S, H, E, K = SystemClock> {
    listener: TlsListener,
    state: Arc<ServerState<S, H, E, K>>,
}

impl DicelogServer<SqliteStore, SqliteStore, DiceExecutor<SqliteStore>> {
    /// Opens the database, loads the certificate and binds, all as
    /// described by `config`.
    pub async fn from_config(
        config: &ServerConfig,
    ) -> Result<SqliteDicelogServer, DicelogError> {
        let store = Arc::new(SqliteStore::open(&config.database_file)?);
        let identity =
            ServerIdentity::from_pem_files(&config.cert_file, &config.key_file)?;
        if let Some(fingerprint) = identity.fingerprint() {
            tracing::info!(%fingerprint, "server certificate loaded");
        }

        let auth = Arc::new(SessionAuthenticator::new(
            Arc::clone(&store),
            config.session_config(),
        ));
        let executor = DiceExecutor::new(Arc::clone(&store));

        DicelogServerBuilder::new()
            .bind(&config.bind_addr)
            .timeouts(config.timeouts())
            .auth_extension(config.auth_extension())
            .identity(identity)
            .build(auth, store, executor)
            .await
    }
}

impl<S, H, E, K> DicelogServer<S, H, E, K>
where
    S: CredentialStore,
    H: HistoryStore,
    E: CommandExecutor,
    K: Clock,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming TCP connections and spawns a task for each that
    /// completes the TLS handshake and then runs the connection handler.
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), DicelogError> {
        tracing::info!(addr = ?self.local_addr().ok(), "DiceLog server running");

        loop {
            match self.listener.accept().await {
                Ok(incoming) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let peer = incoming.peer_addr();
                        let conn = match incoming.handshake().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(
                                    %peer,
                                    error = %e,
                                    "tls handshake failed"
                                );
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                %peer,
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
