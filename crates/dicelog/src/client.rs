//! Client side of the session protocol.
//!
//! Every command travels as: TokenMessage → Ack → DiscordCommand →
//! DiscordResponse. When the server rejects the token the client asks a
//! [`PasswordPrompt`] for the password, logs in, stores the new token and
//! resends the same command.

use std::time::Duration;

use dicelog_protocol::{
    AuthMessage, AuthResponse, Codec, DiscordCommand, DiscordResponse,
    JsonCodec, TokenMessage,
};
use dicelog_transport::{ClientConnection, Connection, TlsDialer};

use crate::config::ClientConfig;
use crate::handler::{recv_frame, send_message, MAX_AUTH_ATTEMPTS};
use crate::token_file::TokenFile;
use crate::DicelogError;

/// Resends after a successful login before the client gives up.
pub const MAX_RESENDS: usize = 3;

/// Local result when the server's reply cannot be understood.
pub const BAD_SERVER_RESPONSE: &str = "Bad server response";

/// Local result when every login attempt failed.
pub const AUTH_FAILED: &str = "Authentication failed";

/// Source of passwords when the server asks the client to log in.
pub trait PasswordPrompt: Send {
    /// Returns the password for `username`.
    ///
    /// `attempts_left` includes the attempt being made.
    fn password(
        &mut self,
        username: &str,
        attempts_left: usize,
    ) -> std::io::Result<String>;
}

/// What one token/command round produced.
enum Round {
    Done(DiscordResponse),
    Reauthenticated,
}

/// A connection to a DiceLog server plus the session token.
pub struct Client<C, P> {
    conn: Option<C>,
    codec: JsonCodec,
    token: String,
    token_file: TokenFile,
    username: String,
    prompt: P,
    auth_extension: Duration,
}

impl<P: PasswordPrompt> Client<ClientConnection, P> {
    /// Dials the configured server over TLS.
    pub async fn connect(
        config: &ClientConfig,
        prompt: P,
    ) -> Result<Self, DicelogError> {
        let dialer = TlsDialer::new(&config.tls_config()?, config.timeouts())?;
        let conn = dialer.connect(&config.server_addr).await?;
        tracing::info!(addr = %config.server_addr, "connected");

        let client = Self::new(
            conn,
            TokenFile::new(&config.token_file),
            config.username.as_str(),
            prompt,
        )?;
        Ok(client.with_auth_extension(config.auth_extension()))
    }
}

impl<C: Connection, P: PasswordPrompt> Client<C, P> {
    /// Wraps an established connection and loads the stored token.
    pub fn new(
        conn: C,
        token_file: TokenFile,
        username: impl Into<String>,
        prompt: P,
    ) -> Result<Self, DicelogError> {
        let token = token_file.load()?;
        Ok(Self {
            conn: Some(conn),
            codec: JsonCodec,
            token,
            token_file,
            username: username.into(),
            prompt,
            auth_extension: Duration::from_secs(60),
        })
    }

    /// Sets the extra write time granted while logging in.
    pub fn with_auth_extension(mut self, extension: Duration) -> Self {
        self.auth_extension = extension;
        self
    }

    /// The session token currently in use.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Sends `command` and returns the server's response.
    ///
    /// Rejected tokens trigger a login and a resend. "Bad server response"
    /// and "Authentication failed" come back as `Ok` results; only
    /// transport and local I/O faults are errors.
    pub async fn send_command(
        &mut self,
        command: &DiscordCommand,
    ) -> Result<DiscordResponse, DicelogError> {
        for _ in 0..=MAX_RESENDS {
            let round = match self.round(command).await {
                Ok(round) => round,
                Err(e) => {
                    self.abandon_connection().await;
                    return Err(e);
                }
            };
            match round {
                Round::Done(response) => return Ok(response),
                Round::Reauthenticated => {
                    tracing::debug!(
                        interaction_id = command.interaction_id,
                        "resending command"
                    );
                }
            }
        }
        tracing::warn!("server rejected every fresh token");
        Ok(DiscordResponse::rejected(AUTH_FAILED))
    }

    /// Tells the server the session is over and closes the connection.
    pub async fn close_session(&mut self) -> Result<(), DicelogError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        send_message(&mut conn, &self.codec, &TokenMessage::last(self.token.as_str()))
            .await?;
        conn.close().await?;
        tracing::info!("session closed");
        Ok(())
    }

    async fn round(
        &mut self,
        command: &DiscordCommand,
    ) -> Result<Round, DicelogError> {
        let conn = self.conn.as_mut().ok_or(DicelogError::NotConnected)?;

        send_message(conn, &self.codec, &TokenMessage::new(self.token.as_str()))
            .await?;
        recv_frame(conn).await?;
        send_message(conn, &self.codec, command).await?;
        let frame = recv_frame(conn).await?;

        let response: DiscordResponse = match self.codec.decode(&frame) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "malformed command response");
                return Ok(Round::Done(DiscordResponse::rejected(BAD_SERVER_RESPONSE)));
            }
        };

        match response.is_authenticated {
            Some(true) => Ok(Round::Done(response)),
            None => Ok(Round::Done(DiscordResponse::rejected(BAD_SERVER_RESPONSE))),
            Some(false) => {
                tracing::info!(
                    reason = response.command_response.as_deref().unwrap_or(""),
                    "token rejected, logging in"
                );
                if self.login().await? {
                    Ok(Round::Reauthenticated)
                } else {
                    Ok(Round::Done(DiscordResponse::rejected(AUTH_FAILED)))
                }
            }
        }
    }

    /// Runs up to [`MAX_AUTH_ATTEMPTS`] password logins.
    ///
    /// On exhaustion the connection is closed.
    async fn login(&mut self) -> Result<bool, DicelogError> {
        let conn = self.conn.as_mut().ok_or(DicelogError::NotConnected)?;
        let base_write = conn.write_timeout();
        conn.set_write_timeout(base_write + self.auth_extension);

        for attempt in 0..MAX_AUTH_ATTEMPTS {
            let password = self
                .prompt
                .password(&self.username, MAX_AUTH_ATTEMPTS - attempt)?;

            let conn = self.conn.as_mut().ok_or(DicelogError::NotConnected)?;
            let message = AuthMessage {
                username: self.username.clone(),
                password,
            };
            send_message(conn, &self.codec, &message).await?;
            let frame = recv_frame(conn).await?;

            match self.codec.decode::<AuthResponse>(&frame) {
                Ok(AuthResponse {
                    is_authenticated: Some(true),
                    token: Some(token),
                }) => {
                    conn.set_write_timeout(base_write);
                    tracing::info!(username = %self.username, "logged in");
                    self.adopt_token(token);
                    return Ok(true);
                }
                Ok(_) => tracing::info!(username = %self.username, "login rejected"),
                Err(e) => tracing::debug!(error = %e, "malformed auth response"),
            }
        }

        self.abandon_connection().await;
        Ok(false)
    }

    /// Closes and forgets the connection after a fault or a failed login.
    async fn abandon_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "close of abandoned connection");
            }
        }
    }

    fn adopt_token(&mut self, token: String) {
        if let Err(e) = self.token_file.store(&token) {
            tracing::warn!(
                path = %self.token_file.path().display(),
                error = %e,
                "session token not saved"
            );
        }
        self.token = token;
    }
}
