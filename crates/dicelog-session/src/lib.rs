//! Identity and session management for DiceLog.
//!
//! This crate answers two questions for the server:
//!
//! 1. **Who is this?** Identities with salted password credentials
//!    ([`SessionAuthenticator::authenticate`]).
//! 2. **Is this token still good?** Random session tokens bound to an
//!    identity, valid for a configurable window
//!    ([`SessionAuthenticator::is_valid`]).
//!
//! Persistence is behind the [`CredentialStore`] trait. This crate ships an
//! in-memory implementation; `dicelog-store` provides the SQLite one.
//!
//! # How it fits in the stack
//!
//! ```text
//! Protocol engine (above)  ← asks "is this token valid?", "are these credentials right?"
//!     ↕
//! Session layer (this crate)  ← tokens, credentials, validity window
//!     ↕
//! CredentialStore (below)  ← memory or SQLite
//! ```

mod authenticator;
mod clock;
mod credential;
mod error;
mod identity;
mod session;
mod store;

pub use authenticator::SessionAuthenticator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{
    generate_salt, generate_token, hash_password, ALPHABET, MIN_SECRET_LENGTH,
    SALT_LENGTH, TOKEN_LENGTH,
};
pub use error::SessionError;
pub use identity::{Credential, IdentityId, IdentityRecord};
pub use session::{SessionConfig, SessionToken, TokenStatus, TokenValidity};
pub use store::{CredentialStore, InsertOutcome, MemoryCredentialStore};
