//! Identity types: who can authenticate, and how their password is checked.

use std::fmt;

use subtle::ConstantTimeEq;

use crate::credential::hash_password;

/// A unique identifier for an identity.
///
/// Ids are allocated at random from `[0, i32::MAX)` so they fit the
/// signed integer columns of the SQLite store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId(pub u32);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I-{}", self.0)
    }
}

/// Salt plus salted digest of a password.
///
/// `digest` is `base64(SHA-256(password ++ salt))`. The plaintext is never
/// stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub salt: String,
    pub digest: String,
}

impl Credential {
    /// Whether `plaintext` hashes to the stored digest with this salt.
    ///
    /// The comparison runs in constant time.
    pub fn matches(&self, plaintext: &str) -> bool {
        let computed = hash_password(plaintext, &self.salt);
        computed.as_bytes().ct_eq(self.digest.as_bytes()).into()
    }
}

/// A stored identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: IdentityId,
    /// Unique display name used to log in.
    pub name: String,
    pub credential: Credential,
}
