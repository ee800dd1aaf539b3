//! Random secrets and password hashing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Characters used for salts and session tokens.
pub const ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890+/=";

/// Length of a per-identity salt.
pub const SALT_LENGTH: usize = 64;

/// Length of a session token.
pub const TOKEN_LENGTH: usize = 32;

/// Minimum length of identity names and passwords.
pub const MIN_SECRET_LENGTH: usize = 3;

fn random_string<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect()
}

/// Generates a fresh salt.
pub fn generate_salt() -> String {
    random_string(&mut rand::rng(), SALT_LENGTH)
}

/// Generates a candidate session token.
///
/// Uniqueness is not checked here; the store rejects collisions on insert.
pub fn generate_token() -> String {
    random_string(&mut rand::rng(), TOKEN_LENGTH)
}

/// `base64(SHA-256(utf8(password ++ salt)))`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    STANDARD.encode(hasher.finalize())
}
