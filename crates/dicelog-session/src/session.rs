//! Session types: tokens and the rules for when they are valid.
//!
//! A session token is a random string the server hands out after a
//! successful password login. It is bound to one identity and stamped with
//! its issuance time. Expiry is computed on read from that stamp; expired
//! tokens are never deleted.

use crate::IdentityId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for token validity.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a token stays valid after issuance.
    ///
    /// Default: 172800 (two days).
    pub token_timeout_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_timeout_secs: 172_800,
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// A stored session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub identity: IdentityId,
    /// Issuance time in unix seconds.
    pub issued_at: i64,
}

/// What the store knows about a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStatus {
    pub identity: IdentityId,
    /// Seconds since issuance. Negative if the token was issued "in the
    /// future" relative to the current clock.
    pub age_secs: i64,
}

/// Outcome of checking a token against the validity window.
///
/// ```text
///   issued ──(0 <= age <= timeout)──→ Valid
///      │
///      └──(age < 0 or age > timeout)──→ Expired
///
///   never issued ──→ Unknown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidity {
    /// The token may be used; it belongs to this identity.
    Valid(IdentityId),
    /// The token exists but is outside its validity window.
    Expired(IdentityId),
    /// No such token.
    Unknown,
}

impl TokenValidity {
    /// Classifies a status against the configured timeout.
    pub fn from_status(status: Option<TokenStatus>, timeout_secs: i64) -> Self {
        match status {
            None => Self::Unknown,
            Some(s) if (0..=timeout_secs).contains(&s.age_secs) => {
                Self::Valid(s.identity)
            }
            Some(s) => Self::Expired(s.identity),
        }
    }

    /// The identity this token is valid for, if any.
    pub fn identity(self) -> Option<IdentityId> {
        match self {
            Self::Valid(id) => Some(id),
            Self::Expired(_) | Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(age_secs: i64) -> Option<TokenStatus> {
        Some(TokenStatus {
            identity: IdentityId(1),
            age_secs,
        })
    }

    #[test]
    fn test_from_status_none_is_unknown() {
        assert_eq!(TokenValidity::from_status(None, 10), TokenValidity::Unknown);
    }

    #[test]
    fn test_from_status_window_bounds_are_inclusive() {
        assert_eq!(
            TokenValidity::from_status(status(0), 10),
            TokenValidity::Valid(IdentityId(1))
        );
        assert_eq!(
            TokenValidity::from_status(status(10), 10),
            TokenValidity::Valid(IdentityId(1))
        );
    }

    #[test]
    fn test_from_status_outside_window_is_expired() {
        assert_eq!(
            TokenValidity::from_status(status(11), 10),
            TokenValidity::Expired(IdentityId(1))
        );
        assert_eq!(
            TokenValidity::from_status(status(-1), 10),
            TokenValidity::Expired(IdentityId(1))
        );
    }

    #[test]
    fn test_identity_only_for_valid() {
        assert_eq!(
            TokenValidity::Valid(IdentityId(3)).identity(),
            Some(IdentityId(3))
        );
        assert_eq!(TokenValidity::Expired(IdentityId(3)).identity(), None);
        assert_eq!(TokenValidity::Unknown.identity(), None);
    }
}
