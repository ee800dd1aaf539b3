//! Password verification, token issuance and token validation.
//!
//! [`SessionAuthenticator`] is the only component that touches credentials.
//! The protocol engine asks it two things: "is this token valid, and for
//! whom?" and "do these credentials check out?". Administrative tooling uses
//! it to provision identities and change passwords.
//!
//! Read paths fail closed: a store error during verification or lookup is
//! logged and treated as "no".

use std::sync::Arc;

use rand::Rng;

use crate::credential::{generate_salt, generate_token, hash_password};
use crate::{
    Clock, Credential, CredentialStore, IdentityId, IdentityRecord,
    InsertOutcome, SessionConfig, SessionError, SessionToken, SystemClock,
    TokenStatus, TokenValidity, MIN_SECRET_LENGTH,
};

/// How many fresh candidates to try before giving up on a collision.
const MAX_GENERATION_ATTEMPTS: usize = 16;

/// Verifies credentials and manages session tokens on top of a store.
///
/// Cheap to share: wrap it in an `Arc` and hand it to every connection task.
pub struct SessionAuthenticator<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: SessionConfig,
}

impl<S: CredentialStore> SessionAuthenticator<S> {
    /// Creates an authenticator backed by the system clock.
    pub fn new(store: Arc<S>, config: SessionConfig) -> Self {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<S: CredentialStore, C: Clock> SessionAuthenticator<S, C> {
    /// Creates an authenticator with an explicit clock.
    pub fn with_clock(store: Arc<S>, config: SessionConfig, clock: C) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether `plaintext` is the password of the identity named `name`.
    ///
    /// `false` if the identity does not exist or the store fails.
    pub fn verify_password(&self, name: &str, plaintext: &str) -> bool {
        self.authenticate(name, plaintext).is_some()
    }

    /// Verifies the password and resolves the identity id.
    pub fn authenticate(
        &self,
        name: &str,
        plaintext: &str,
    ) -> Option<IdentityId> {
        match self.store.identity_by_name(name) {
            Ok(Some(record)) if record.credential.matches(plaintext) => {
                Some(record.id)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "credential lookup failed");
                None
            }
        }
    }

    /// Issues a new token for `identity`, stamped with the current time.
    ///
    /// # Errors
    /// - [`SessionError::IdentityNotFound`]: no such identity
    /// - [`SessionError::TokenIssuance`]: every candidate collided
    /// - [`SessionError::Storage`]: the store failed
    pub fn issue_token(
        &self,
        identity: IdentityId,
    ) -> Result<String, SessionError> {
        if self
            .store
            .identity_by_id(identity)
            .map_err(SessionError::storage)?
            .is_none()
        {
            return Err(SessionError::IdentityNotFound(identity));
        }

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let token = SessionToken {
                token: generate_token(),
                identity,
                issued_at: self.clock.now(),
            };
            if self
                .store
                .insert_token(&token)
                .map_err(SessionError::storage)?
            {
                tracing::debug!(%identity, "session token issued");
                return Ok(token.token);
            }
            tracing::debug!(%identity, "token collision, regenerating");
        }

        Err(SessionError::TokenIssuance)
    }

    /// Identity and age of a stored token, or `None` if it does not exist.
    pub fn token_status(&self, token: &str) -> Option<TokenStatus> {
        match self.store.find_token(token) {
            Ok(found) => found.map(|t| TokenStatus {
                identity: t.identity,
                age_secs: self.clock.now() - t.issued_at,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "token lookup failed");
                None
            }
        }
    }

    /// Checks `token` against the validity window.
    pub fn is_valid(&self, token: &str) -> TokenValidity {
        TokenValidity::from_status(
            self.token_status(token),
            self.config.token_timeout_secs,
        )
    }

    /// Creates a new identity with a random id.
    ///
    /// # Errors
    /// - [`SessionError::NameTooShort`] / [`SessionError::PasswordTooShort`]
    /// - [`SessionError::NameTaken`]: the name is already registered
    /// - [`SessionError::IdAllocation`]: every candidate id was taken
    /// - [`SessionError::Storage`]: the store failed
    pub fn provision_identity(
        &self,
        name: &str,
        password: &str,
    ) -> Result<IdentityId, SessionError> {
        if name.chars().count() < MIN_SECRET_LENGTH {
            return Err(SessionError::NameTooShort {
                min: MIN_SECRET_LENGTH,
            });
        }
        check_password(password)?;

        if self
            .store
            .identity_by_name(name)
            .map_err(SessionError::storage)?
            .is_some()
        {
            return Err(SessionError::NameTaken(name.to_string()));
        }

        let salt = generate_salt();
        let credential = Credential {
            digest: hash_password(password, &salt),
            salt,
        };

        let mut rng = rand::rng();
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let record = IdentityRecord {
                id: IdentityId(rng.random_range(0..i32::MAX as u32)),
                name: name.to_string(),
                credential: credential.clone(),
            };
            match self
                .store
                .insert_identity(&record)
                .map_err(SessionError::storage)?
            {
                InsertOutcome::Inserted => {
                    tracing::info!(identity = %record.id, name, "identity provisioned");
                    return Ok(record.id);
                }
                InsertOutcome::IdTaken => continue,
                InsertOutcome::NameTaken => {
                    return Err(SessionError::NameTaken(name.to_string()));
                }
            }
        }

        Err(SessionError::IdAllocation)
    }

    /// Sets a new password, rotating the salt. Returns the new digest.
    ///
    /// Existing tokens stay valid.
    pub fn change_password(
        &self,
        identity: IdentityId,
        new_password: &str,
    ) -> Result<String, SessionError> {
        check_password(new_password)?;

        let salt = generate_salt();
        let credential = Credential {
            digest: hash_password(new_password, &salt),
            salt,
        };

        let updated = self
            .store
            .update_credential(identity, &credential)
            .map_err(SessionError::storage)?;
        if !updated {
            return Err(SessionError::IdentityNotFound(identity));
        }

        tracing::info!(%identity, "password changed");
        Ok(credential.digest)
    }

    /// Resolves a name to its identity id.
    pub fn identity_id(&self, name: &str) -> Option<IdentityId> {
        match self.store.identity_by_name(name) {
            Ok(found) => found.map(|r| r.id),
            Err(e) => {
                tracing::warn!(error = %e, "identity lookup failed");
                None
            }
        }
    }
}

fn check_password(password: &str) -> Result<(), SessionError> {
    if password.chars().count() < MIN_SECRET_LENGTH {
        return Err(SessionError::PasswordTooShort {
            min: MIN_SECRET_LENGTH,
        });
    }
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================
