//! Password hashing and opaque token handling.
//!
//! File passwords are stored as Argon2id PHC strings. Session tokens and
//! API keys are random base64url strings persisted only as SHA-256 digests.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

const TOKEN_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Failed to hash password: {0}")]
    Hash(String),
    #[error("Secure random source unavailable")]
    Random,
}

/// Hash a plaintext password for storage.
pub fn hash_password(password: &str) -> Result<String, SecretError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SecretError::Hash(e.to_string()))
}

/// Check a plaintext password against a hash produced by [`hash_password`].
/// Malformed hashes never verify.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let Ok(hash) = PasswordHash::new(encoded) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}

/// Generate a random opaque token (session tokens, API keys).
pub fn generate_token() -> Result<String, SecretError> {
    let mut bytes = [0u8; TOKEN_LEN];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| SecretError::Random)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest under which a token is persisted.
pub fn token_digest(token: &str) -> String {
    let digest = digest::digest(&digest::SHA256, token.as_bytes());
    URL_SAFE_NO_PAD.encode(digest.as_ref())
}
