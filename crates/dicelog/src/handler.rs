//! Per-connection handler: token check, password login, command dispatch.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow repeats until the peer leaves:
//!   1. Receive TokenMessage → `isLast` or garbage closes the connection
//!   2. Send Ack, then receive the DiscordCommand
//!   3. Valid token → execute and reply with the result
//!   4. Otherwise → reject, then up to five AuthMessage attempts
//!
//! A connection is bound to the first identity that authenticates on it.
//! Presenting another identity's credentials or token later closes the
//! connection without a reply.

use std::sync::Arc;

use dicelog_protocol::{
    Ack, AuthMessage, AuthResponse, Codec, DiscordCommand, DiscordResponse,
    TokenMessage,
};
use dicelog_session::{Clock, CredentialStore, IdentityId, TokenValidity};
use dicelog_store::HistoryStore;
use dicelog_transport::{Connection, TransportError};
use serde::Serialize;

use crate::server::ServerState;
use crate::{CommandExecutor, DicelogError};

/// Failed AuthMessages tolerated before the connection is closed.
pub const MAX_AUTH_ATTEMPTS: usize = 5;

/// `commandResponse` sent when the presented token is unknown or expired.
pub const BAD_TOKEN_RESPONSE: &str = "Authentication error (bad session token)";

/// `commandResponse` sent when an authenticated command does not decode.
pub const MALFORMED_COMMAND_RESPONSE: &str =
    "Error: Malformed DiscordCommand Packet";

/// How a password login round ended.
enum LoginOutcome {
    Authenticated,
    Exhausted,
    IdentityMismatch,
    PeerClosed,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<Conn, S, H, E, K>(
    mut conn: Conn,
    state: Arc<ServerState<S, H, E, K>>,
) -> Result<(), DicelogError>
where
    Conn: Connection,
    S: CredentialStore,
    H: HistoryStore,
    E: CommandExecutor,
    K: Clock,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let mut bound: Option<IdentityId> = None;

    loop {
        // --- Step 1: token ---
        let Some(frame) = conn.recv().await? else {
            tracing::info!(%conn_id, "connection closed by peer");
            return Ok(());
        };
        let token: TokenMessage = match state.codec.decode(&frame) {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "malformed token message");
                return close(conn).await;
            }
        };
        if token.is_last {
            tracing::info!(%conn_id, "session ended by client");
            return close(conn).await;
        }

        let validity = state.auth.is_valid(&token.token);

        // --- Step 2: ack, then the command ---
        send_message(&mut conn, &state.codec, &Ack {}).await?;
        let Some(command_frame) = conn.recv().await? else {
            tracing::info!(%conn_id, "connection closed by peer");
            return Ok(());
        };

        // --- Step 3/4: dispatch or log in ---
        match validity {
            TokenValidity::Valid(identity) => {
                if !bind(&mut bound, identity, &conn) {
                    return close(conn).await;
                }
                let response = dispatch(&state, identity, &command_frame);
                send_message(&mut conn, &state.codec, &response).await?;
            }
            TokenValidity::Expired(_) | TokenValidity::Unknown => {
                tracing::debug!(%conn_id, ?validity, "token rejected");
                send_message(
                    &mut conn,
                    &state.codec,
                    &DiscordResponse::rejected(BAD_TOKEN_RESPONSE),
                )
                .await?;

                match login(&mut conn, &state, &mut bound).await? {
                    LoginOutcome::Authenticated => {}
                    LoginOutcome::PeerClosed => {
                        tracing::info!(%conn_id, "connection closed during login");
                        return Ok(());
                    }
                    LoginOutcome::Exhausted => {
                        tracing::info!(%conn_id, "too many failed logins");
                        return close(conn).await;
                    }
                    LoginOutcome::IdentityMismatch => return close(conn).await,
                }
            }
        }
    }
}

/// Runs the password login loop after a rejected token.
///
/// The read timeout is widened for the duration so a human can type.
async fn login<Conn, S, H, E, K>(
    conn: &mut Conn,
    state: &ServerState<S, H, E, K>,
    bound: &mut Option<IdentityId>,
) -> Result<LoginOutcome, DicelogError>
where
    Conn: Connection,
    S: CredentialStore,
    H: HistoryStore,
    E: CommandExecutor,
    K: Clock,
{
    let conn_id = conn.id();
    let base_read = conn.read_timeout();
    conn.set_read_timeout(base_read + state.auth_extension);

    let mut failures = 0;
    while failures < MAX_AUTH_ATTEMPTS {
        let Some(frame) = conn.recv().await? else {
            return Ok(LoginOutcome::PeerClosed);
        };

        let identity = match state.codec.decode::<AuthMessage>(&frame) {
            Ok(msg) => state.auth.authenticate(&msg.username, &msg.password),
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "malformed auth message");
                None
            }
        };

        let Some(identity) = identity else {
            failures += 1;
            tracing::debug!(%conn_id, failures, "login failed");
            send_message(conn, &state.codec, &AuthResponse::failure()).await?;
            continue;
        };

        if !bind(bound, identity, conn) {
            return Ok(LoginOutcome::IdentityMismatch);
        }

        match state.auth.issue_token(identity) {
            Ok(token) => {
                tracing::info!(%conn_id, %identity, "authenticated");
                send_message(conn, &state.codec, &AuthResponse::success(token))
                    .await?;
                conn.set_read_timeout(base_read);
                return Ok(LoginOutcome::Authenticated);
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(%conn_id, %identity, error = %e, "token issuance failed");
                send_message(conn, &state.codec, &AuthResponse::failure()).await?;
            }
        }
    }

    Ok(LoginOutcome::Exhausted)
}

/// Binds the connection to `identity` on first use.
///
/// Returns `false` if it is already bound to someone else.
fn bind<Conn: Connection>(
    bound: &mut Option<IdentityId>,
    identity: IdentityId,
    conn: &Conn,
) -> bool {
    match *bound {
        None => {
            *bound = Some(identity);
            true
        }
        Some(owner) if owner == identity => true,
        Some(owner) => {
            tracing::warn!(
                conn_id = %conn.id(),
                %owner,
                presented = %identity,
                "identity mismatch on bound connection, closing"
            );
            false
        }
    }
}

/// Decodes and executes a command from an authenticated identity.
fn dispatch<S, H, E, K>(
    state: &ServerState<S, H, E, K>,
    identity: IdentityId,
    frame: &[u8],
) -> DiscordResponse
where
    S: CredentialStore,
    H: HistoryStore,
    E: CommandExecutor,
    K: Clock,
{
    let command: DiscordCommand = match state.codec.decode(frame) {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!(%identity, error = %e, "malformed command");
            return DiscordResponse::authenticated(MALFORMED_COMMAND_RESPONSE);
        }
    };

    tracing::debug!(
        %identity,
        interaction_id = command.interaction_id,
        command_id = command.command_id,
        "executing command"
    );
    if let Err(e) = state.history.record_command(identity, &command) {
        tracing::warn!(
            %identity,
            interaction_id = command.interaction_id,
            error = %e,
            "command not recorded"
        );
    }

    DiscordResponse::authenticated(state.executor.execute(identity, &command))
}

/// Encodes `message` and sends it as one frame.
pub(crate) async fn send_message<Conn, C, T>(
    conn: &mut Conn,
    codec: &C,
    message: &T,
) -> Result<(), DicelogError>
where
    Conn: Connection,
    C: Codec,
    T: Serialize,
{
    let bytes = codec.encode(message)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Receives one frame, treating end-of-stream as an error.
pub(crate) async fn recv_frame<Conn: Connection>(
    conn: &mut Conn,
) -> Result<Vec<u8>, DicelogError> {
    conn.recv().await?.ok_or_else(|| {
        TransportError::ConnectionClosed("peer closed the connection".into())
            .into()
    })
}

async fn close<Conn: Connection>(mut conn: Conn) -> Result<(), DicelogError> {
    conn.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    //! Scenario tests driving the handler over an in-process pipe.

    use std::time::Duration;

    use dicelog_protocol::JsonCodec;
    use dicelog_session::{
        ManualClock, MemoryCredentialStore, SessionAuthenticator, SessionConfig,
    };
    use dicelog_store::{DieRoll, DieStats, SqliteStore, StatsQuery};
    use dicelog_transport::{FramedConnection, Timeouts};
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::dice::{DiceExecutor, ROLL_COMMAND};

    const NOW: i64 = 1_704_067_200;
    const TIMEOUT_SECS: i64 = 3600;

    type Peer = FramedConnection<DuplexStream>;

    /// Executor that echoes the command text.
    struct Echo;

    impl CommandExecutor for Echo {
        fn execute(&self, identity: IdentityId, command: &DiscordCommand) -> String {
            format!("{identity}:{}", command.interaction_data)
        }
    }

    struct Harness<H: HistoryStore, E: CommandExecutor> {
        auth: Arc<SessionAuthenticator<MemoryCredentialStore, ManualClock>>,
        clock: ManualClock,
        history: Arc<H>,
        executor: Option<E>,
    }

    impl<H: HistoryStore, E: CommandExecutor> Harness<H, E> {
        fn new(history: H, executor: E) -> Self {
            let clock = ManualClock::new(NOW);
            let auth = Arc::new(SessionAuthenticator::with_clock(
                Arc::new(MemoryCredentialStore::new()),
                SessionConfig {
                    token_timeout_secs: TIMEOUT_SECS,
                },
                clock.clone(),
            ));
            Self {
                auth,
                clock,
                history: Arc::new(history),
                executor: Some(executor),
            }
        }

        /// Starts a handler task and returns the client end.
        fn connect(&mut self) -> (Peer, JoinHandle<Result<(), DicelogError>>) {
            let state = Arc::new(ServerState::new(
                Arc::clone(&self.auth),
                Arc::clone(&self.history),
                self.executor.take().unwrap(),
                Duration::from_secs(1),
            ));
            let (client, server) = tokio::io::duplex(8192);
            let timeouts = Timeouts::from_millis(2000, 2000);
            let server = FramedConnection::new(server, timeouts);
            let handle = tokio::spawn(handle_connection(server, state));
            (FramedConnection::new(client, timeouts), handle)
        }
    }

    fn echo_harness() -> Harness<SqliteStore, Echo> {
        Harness::new(SqliteStore::open_in_memory().unwrap(), Echo)
    }

    fn command(data: &str) -> DiscordCommand {
        DiscordCommand {
            interaction_id: 5,
            interaction_type: 0,
            command_id: ROLL_COMMAND,
            interaction_data: data.into(),
            channel_id: 1,
            channel_name: "dummy-channel".into(),
            user_id: 1,
            username: "dummy username".into(),
            user_discriminator: "dummy discriminator".into(),
            user_display_name: "dummy display name".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
        }
    }

    async fn send<T: Serialize>(peer: &mut Peer, message: &T) {
        send_message(peer, &JsonCodec, message).await.unwrap();
    }

    async fn recv<T: serde::de::DeserializeOwned>(peer: &mut Peer) -> T {
        let frame = peer.recv().await.unwrap().expect("frame");
        JsonCodec.decode(&frame).unwrap()
    }

    /// Sends a token and a command, returning the response.
    async fn exchange(peer: &mut Peer, token: &str, cmd: &DiscordCommand) -> DiscordResponse {
        send(peer, &TokenMessage::new(token)).await;
        let _: Ack = recv(peer).await;
        send(peer, cmd).await;
        recv(peer).await
    }

    async fn login(peer: &mut Peer, username: &str, password: &str) -> AuthResponse {
        send(
            peer,
            &AuthMessage {
                username: username.into(),
                password: password.into(),
            },
        )
        .await;
        recv(peer).await
    }

    async fn assert_closed(peer: &mut Peer) {
        assert!(matches!(peer.recv().await, Ok(None)));
    }

    // =====================================================================
    // Valid tokens
    // =====================================================================

    #[tokio::test]
    async fn test_valid_token_command_executed() {
        let mut harness = echo_harness();
        let id = harness.auth.provision_identity("alice", "secret123").unwrap();
        let token = harness.auth.issue_token(id).unwrap();
        let (mut peer, handle) = harness.connect();

        let response = exchange(&mut peer, &token, &command("1d20")).await;
        assert_eq!(response, DiscordResponse::authenticated(format!("{id}:1d20")));

        // Several commands on one connection.
        let response = exchange(&mut peer, &token, &command("2d6")).await;
        assert_eq!(response.command_response.unwrap(), format!("{id}:2d6"));

        send(&mut peer, &TokenMessage::last(&token)).await;
        assert_closed(&mut peer).await;
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_valid_token_command_recorded_in_history() {
        let mut harness = echo_harness();
        let id = harness.auth.provision_identity("alice", "secret123").unwrap();
        let token = harness.auth.issue_token(id).unwrap();
        let history = Arc::clone(&harness.history);
        let (mut peer, _handle) = harness.connect();

        exchange(&mut peer, &token, &command("1d20")).await;
        history.record_rolls(5, &[DieRoll { die_size: 20, value: 4 }]).unwrap();

        let stats = history
            .die_stats(&StatsQuery {
                identity: id,
                user_id: Some(1),
                within_secs: None,
                now: NOW,
            })
            .unwrap();
        assert_eq!(stats.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_command_reports_error_payload() {
        let mut harness = echo_harness();
        let id = harness.auth.provision_identity("alice", "secret123").unwrap();
        let token = harness.auth.issue_token(id).unwrap();
        let (mut peer, _handle) = harness.connect();

        send(&mut peer, &TokenMessage::new(&token)).await;
        let _: Ack = recv(&mut peer).await;
        peer.send(br#"{"interaction_id": 1}"#).await.unwrap();
        let response: DiscordResponse = recv(&mut peer).await;
        assert_eq!(response, DiscordResponse::authenticated(MALFORMED_COMMAND_RESPONSE));

        // Connection stays usable.
        let response = exchange(&mut peer, &token, &command("ok")).await;
        assert_eq!(response.is_authenticated, Some(true));
    }

    #[tokio::test]
    async fn test_history_failure_does_not_fail_response() {
        struct BrokenHistory;

        #[derive(Debug, thiserror::Error)]
        #[error("read-only database")]
        struct ReadOnly;

        impl HistoryStore for BrokenHistory {
            type Error = ReadOnly;
            fn record_command(&self, _: IdentityId, _: &DiscordCommand) -> Result<(), ReadOnly> {
                Err(ReadOnly)
            }
            fn record_rolls(&self, _: u64, _: &[DieRoll]) -> Result<(), ReadOnly> {
                Err(ReadOnly)
            }
            fn die_stats(&self, _: &StatsQuery) -> Result<Vec<DieStats>, ReadOnly> {
                Err(ReadOnly)
            }
        }

        let mut harness = Harness::new(BrokenHistory, Echo);
        let id = harness.auth.provision_identity("alice", "secret123").unwrap();
        let token = harness.auth.issue_token(id).unwrap();
        let (mut peer, _handle) = harness.connect();

        let response = exchange(&mut peer, &token, &command("1d4")).await;
        assert_eq!(response, DiscordResponse::authenticated(format!("{id}:1d4")));
    }

    // =====================================================================
    // Token rejection and login
    // =====================================================================

    #[tokio::test]
    async fn test_expired_token_login_then_resend_succeeds() {
        let history = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut harness = Harness::new(
            SqliteStore::open_in_memory().unwrap(),
            DiceExecutor::new(Arc::clone(&history)),
        );
        let id = harness.auth.provision_identity("alice", "secret123").unwrap();
        let old = harness.auth.issue_token(id).unwrap();
        harness.clock.advance(TIMEOUT_SECS + 1);
        let (mut peer, _handle) = harness.connect();

        let cmd = command("3 1d20+6-1d4 Dummy Message");
        let response = exchange(&mut peer, &old, &cmd).await;
        assert_eq!(response, DiscordResponse::rejected(BAD_TOKEN_RESPONSE));

        let auth = login(&mut peer, "alice", "secret123").await;
        assert!(auth.succeeded());
        let fresh = auth.token.unwrap();
        assert_ne!(fresh, old);

        let response = exchange(&mut peer, &fresh, &cmd).await;
        assert_eq!(response.is_authenticated, Some(true));
        let text = response.command_response.unwrap();
        assert!(text.starts_with(
            "Command: \"3 1d20+6-1d4 Dummy Message\" | Roll: 3 1d20+6-1d4 | Tag: Dummy Message\n"
        ));
        assert_eq!(text.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_unknown_token_bad_password_then_success() {
        let mut harness = echo_harness();
        harness.auth.provision_identity("alice", "secret123").unwrap();
        let (mut peer, _handle) = harness.connect();

        let response = exchange(&mut peer, "", &command("x")).await;
        assert_eq!(response.is_authenticated, Some(false));

        assert_eq!(login(&mut peer, "alice", "nope").await, AuthResponse::failure());
        assert_eq!(login(&mut peer, "mallory", "secret123").await, AuthResponse::failure());

        // Garbage counts as a failed attempt but gets a reply.
        peer.send(b"not json").await.unwrap();
        let reply: AuthResponse = recv(&mut peer).await;
        assert_eq!(reply, AuthResponse::failure());

        assert!(login(&mut peer, "alice", "secret123").await.succeeded());
    }

    #[tokio::test]
    async fn test_five_failed_logins_close_without_sixth_reply() {
        let mut harness = echo_harness();
        harness.auth.provision_identity("alice", "secret123").unwrap();
        let (mut peer, handle) = harness.connect();

        exchange(&mut peer, "stale", &command("x")).await;
        for _ in 0..MAX_AUTH_ATTEMPTS {
            assert_eq!(login(&mut peer, "alice", "wrong").await, AuthResponse::failure());
        }

        // A sixth attempt is never answered.
        let _ = send_message(
            &mut peer,
            &JsonCodec,
            &AuthMessage {
                username: "alice".into(),
                password: "secret123".into(),
            },
        )
        .await;
        assert_closed(&mut peer).await;
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_is_last_closes_immediately() {
        let mut harness = echo_harness();
        let (mut peer, handle) = harness.connect();

        send(&mut peer, &TokenMessage::last("anything")).await;
        assert_closed(&mut peer).await;
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_malformed_token_message_closes_quietly() {
        let mut harness = echo_harness();
        let (mut peer, handle) = harness.connect();

        peer.send(br#"{"token": 5}"#).await.unwrap();
        assert_closed(&mut peer).await;
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_peer_eof_ends_handler_cleanly() {
        let mut harness = echo_harness();
        let (peer, handle) = harness.connect();

        drop(peer);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let mut harness = echo_harness();
        let (_peer, handle) = harness.connect();

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(DicelogError::Transport(TransportError::Timeout { .. }))
        ));
    }

    // =====================================================================
    // Connection binding
    // =====================================================================

    #[tokio::test]
    async fn test_other_identity_token_closes_without_reply() {
        let mut harness = echo_harness();
        let alice = harness.auth.provision_identity("alice", "secret123").unwrap();
        let bob = harness.auth.provision_identity("bob", "hunter22").unwrap();
        let alice_token = harness.auth.issue_token(alice).unwrap();
        let bob_token = harness.auth.issue_token(bob).unwrap();
        let (mut peer, handle) = harness.connect();

        exchange(&mut peer, &alice_token, &command("mine")).await;

        send(&mut peer, &TokenMessage::new(&bob_token)).await;
        let _: Ack = recv(&mut peer).await;
        send(&mut peer, &command("theirs")).await;
        assert_closed(&mut peer).await;
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_other_identity_login_closes_without_reply() {
        let mut harness = echo_harness();
        let alice = harness.auth.provision_identity("alice", "secret123").unwrap();
        harness.auth.provision_identity("bob", "hunter22").unwrap();
        let alice_token = harness.auth.issue_token(alice).unwrap();
        let (mut peer, _handle) = harness.connect();

        exchange(&mut peer, &alice_token, &command("mine")).await;
        exchange(&mut peer, "stale", &command("again")).await;

        send(
            &mut peer,
            &AuthMessage {
                username: "bob".into(),
                password: "hunter22".into(),
            },
        )
        .await;
        assert_closed(&mut peer).await;
    }

    #[tokio::test]
    async fn test_same_identity_relogin_keeps_connection() {
        let mut harness = echo_harness();
        let alice = harness.auth.provision_identity("alice", "secret123").unwrap();
        let token = harness.auth.issue_token(alice).unwrap();
        let (mut peer, _handle) = harness.connect();

        exchange(&mut peer, &token, &command("one")).await;
        harness.clock.advance(TIMEOUT_SECS + 1);

        let response = exchange(&mut peer, &token, &command("two")).await;
        assert_eq!(response.is_authenticated, Some(false));
        let fresh = login(&mut peer, "alice", "secret123").await.token.unwrap();

        let response = exchange(&mut peer, &fresh, &command("two")).await;
        assert_eq!(response, DiscordResponse::authenticated(format!("{alice}:two")));
    }
}
