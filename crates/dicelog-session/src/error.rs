//! Error types for the session layer.

use crate::IdentityId;

/// Errors that can occur while managing identities and tokens.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Identity names must be at least three characters long.
    #[error("name must be at least {min} characters")]
    NameTooShort { min: usize },

    /// Passwords must be at least three characters long.
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    /// Another identity already uses this name.
    #[error("an identity named {0:?} already exists")]
    NameTaken(String),

    /// No identity exists with the given id.
    #[error("identity {0} not found")]
    IdentityNotFound(IdentityId),

    /// No free identity id was found within the retry budget.
    #[error("could not allocate an identity id")]
    IdAllocation,

    /// No unused token was generated within the retry budget.
    #[error("could not issue a session token")]
    TokenIssuance,

    /// The credential store failed.
    #[error("credential store: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SessionError {
    /// Wraps any store error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }
}
