//! # DiceLog
//!
//! Session-authenticated command server for a dice-rolling chat bot.
//!
//! A bot process (the client) forwards chat commands to the DiceLog server
//! over TLS. Every command is preceded by a session token; when the token
//! is unknown or expired the server asks for a password, issues a fresh
//! token and the client resends. Authenticated commands go to a
//! [`CommandExecutor`]; the bundled [`DiceExecutor`](dice::DiceExecutor)
//! rolls dice and reports statistics from the roll history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dicelog::prelude::*;
//!
//! # async fn run() -> Result<(), DicelogError> {
//! let config = ServerConfig::load_or_default("server.toml".as_ref())?;
//! let server = DicelogServer::from_config(&config).await?;
//! server.run().await
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dice;
mod error;
mod executor;
mod handler;
pub mod server;
pub mod token_file;

pub use client::{Client, PasswordPrompt};
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use error::DicelogError;
pub use executor::CommandExecutor;
pub use handler::{BAD_TOKEN_RESPONSE, MALFORMED_COMMAND_RESPONSE, MAX_AUTH_ATTEMPTS};
pub use server::{DicelogServer, DicelogServerBuilder, SqliteDicelogServer};
pub use token_file::TokenFile;

/// Everything needed to run a server or a client.
pub mod prelude {
    pub use crate::dice::DiceExecutor;
    pub use crate::{
        Client, ClientConfig, CommandExecutor, DicelogError, DicelogServer,
        DicelogServerBuilder, PasswordPrompt, ServerConfig, TokenFile,
    };
    pub use dicelog_protocol::{DiscordCommand, DiscordResponse};
    pub use dicelog_session::{IdentityId, SessionAuthenticator};
    pub use dicelog_store::SqliteStore;
    pub use dicelog_transport::ServerIdentity;
}
