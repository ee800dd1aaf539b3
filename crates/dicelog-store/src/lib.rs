//! SQLite persistence for DiceLog.
//!
//! [`SqliteStore`] implements both storage traits the server needs:
//!
//! - [`CredentialStore`](dicelog_session::CredentialStore): identities,
//!   credentials and session tokens
//! - [`HistoryStore`]: an audit record of every command and every die rolled,
//!   plus the aggregate statistics computed from them
//!
//! # Schema
//!
//! ```text
//! admins        (admin_id PK, admin_name UNIQUE, salt, salthash)
//! sessiontokens (token PK, admin_id, date_issued)
//! commands      (interaction_id PK, admin_id, ...DiscordCommand fields)
//! rolls         (interaction_id, die_size, die_roll)
//! ```

mod error;
mod history;
mod sqlite;

pub use error::StoreError;
pub use history::{DieRoll, DieStats, HistoryStore, StatsQuery};
pub use sqlite::SqliteStore;
