//! Message types for DiceLog's wire format.
//!
//! Every struct here is one JSON object on the wire. Field names are fixed
//! by the protocol: some messages use camelCase keys, `DiscordCommand` uses
//! snake_case keys. All fields are required. Fields typed `Option<_>` are
//! *nullable*, not optional: the key must be present, but its value may be
//! `null`.
//!
//! A conversation on one connection looks like this:
//!
//! ```text
//! C → S  TokenMessage
//! S → C  Ack
//! C → S  DiscordCommand
//! S → C  DiscordResponse            (isAuthenticated: true → done)
//!
//!        ...or, if the token was rejected:
//! S → C  DiscordResponse{false}
//! C → S  AuthMessage                (up to five times)
//! S → C  AuthResponse
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Opens every request: the client's current session token.
///
/// `is_last: true` tells the server the client is done with the
/// connection; the server closes without replying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMessage {
    /// Session token, possibly empty when the client has none yet.
    pub token: String,
    /// Marks the final message of a session.
    pub is_last: bool,
}

impl TokenMessage {
    /// A request-opening token message.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            is_last: false,
        }
    }

    /// A session-closing token message.
    pub fn last(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            is_last: true,
        }
    }
}

/// The application command, carried opaquely through the session layer.
///
/// Keys are snake_case on the wire, matching the field names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscordCommand {
    /// Unique id of the interaction that produced the command.
    pub interaction_id: u64,
    /// Kind of interaction, as reported by the chat platform.
    pub interaction_type: i32,
    /// Which command to execute (`1` roll, `2` statistics).
    pub command_id: u64,
    /// Command argument text.
    pub interaction_data: String,
    pub channel_id: u64,
    pub channel_name: String,
    pub user_id: u64,
    pub username: String,
    pub user_discriminator: String,
    pub user_display_name: String,
    /// Time of the interaction, as text.
    pub timestamp: String,
}

/// Credentials offered after a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMessage {
    pub username: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Content-free acknowledgment sent after a [`TokenMessage`].
///
/// Serializes as `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {}

/// Reply to a [`DiscordCommand`].
///
/// `is_authenticated == Some(false)` asks the client to authenticate with
/// an [`AuthMessage`]. `None` is never sent by a well-behaved server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordResponse {
    #[serde(deserialize_with = "Option::deserialize")]
    pub is_authenticated: Option<bool>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub command_response: Option<String>,
}

impl DiscordResponse {
    /// A response to an authenticated command.
    pub fn authenticated(text: impl Into<String>) -> Self {
        Self {
            is_authenticated: Some(true),
            command_response: Some(text.into()),
        }
    }

    /// A response refusing the command.
    pub fn rejected(text: impl Into<String>) -> Self {
        Self {
            is_authenticated: Some(false),
            command_response: Some(text.into()),
        }
    }
}

/// Reply to an [`AuthMessage`].
///
/// On success `token` carries the freshly issued session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(deserialize_with = "Option::deserialize")]
    pub is_authenticated: Option<bool>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub token: Option<String>,
}

impl AuthResponse {
    /// Successful authentication carrying a new token.
    pub fn success(token: impl Into<String>) -> Self {
        Self {
            is_authenticated: Some(true),
            token: Some(token.into()),
        }
    }

    /// Failed authentication. The token is the empty string.
    pub fn failure() -> Self {
        Self {
            is_authenticated: Some(false),
            token: Some(String::new()),
        }
    }

    /// Whether the server accepted the credentials.
    pub fn succeeded(&self) -> bool {
        self.is_authenticated == Some(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
