//! Persistence boundary for identities and tokens.
//!
//! [`CredentialStore`] offers lookups plus inserts that report a collision
//! instead of overwriting. Uniqueness of identity ids, names and tokens is
//! enforced inside the store, atomically with the insert.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{Credential, IdentityId, IdentityRecord, SessionToken};

/// Result of inserting a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The id is already in use. Pick another one.
    IdTaken,
    /// The name is already in use.
    NameTaken,
}

/// Stores identities, credentials and session tokens.
pub trait CredentialStore: Send + Sync + 'static {
    /// The error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    fn identity_by_name(
        &self,
        name: &str,
    ) -> Result<Option<IdentityRecord>, Self::Error>;

    fn identity_by_id(
        &self,
        id: IdentityId,
    ) -> Result<Option<IdentityRecord>, Self::Error>;

    /// Inserts `record` unless its id or name is taken.
    fn insert_identity(
        &self,
        record: &IdentityRecord,
    ) -> Result<InsertOutcome, Self::Error>;

    /// Replaces the credential of an identity. Returns `false` if absent.
    fn update_credential(
        &self,
        id: IdentityId,
        credential: &Credential,
    ) -> Result<bool, Self::Error>;

    /// Inserts `token` unless the token string already exists.
    ///
    /// Returns `false` on collision.
    fn insert_token(&self, token: &SessionToken) -> Result<bool, Self::Error>;

    fn find_token(
        &self,
        token: &str,
    ) -> Result<Option<SessionToken>, Self::Error>;
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    identities: HashMap<IdentityId, IdentityRecord>,
    tokens: HashMap<String, SessionToken>,
}

/// A [`CredentialStore`] that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    type Error = Infallible;

    fn identity_by_name(
        &self,
        name: &str,
    ) -> Result<Option<IdentityRecord>, Infallible> {
        Ok(self
            .lock()
            .identities
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    fn identity_by_id(
        &self,
        id: IdentityId,
    ) -> Result<Option<IdentityRecord>, Infallible> {
        Ok(self.lock().identities.get(&id).cloned())
    }

    fn insert_identity(
        &self,
        record: &IdentityRecord,
    ) -> Result<InsertOutcome, Infallible> {
        let mut inner = self.lock();
        if inner.identities.contains_key(&record.id) {
            return Ok(InsertOutcome::IdTaken);
        }
        if inner.identities.values().any(|r| r.name == record.name) {
            return Ok(InsertOutcome::NameTaken);
        }
        inner.identities.insert(record.id, record.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn update_credential(
        &self,
        id: IdentityId,
        credential: &Credential,
    ) -> Result<bool, Infallible> {
        match self.lock().identities.get_mut(&id) {
            Some(record) => {
                record.credential = credential.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_token(&self, token: &SessionToken) -> Result<bool, Infallible> {
        let mut inner = self.lock();
        if inner.tokens.contains_key(&token.token) {
            return Ok(false);
        }
        inner.tokens.insert(token.token.clone(), token.clone());
        Ok(true)
    }

    fn find_token(
        &self,
        token: &str,
    ) -> Result<Option<SessionToken>, Infallible> {
        Ok(self.lock().tokens.get(token).cloned())
    }
}
