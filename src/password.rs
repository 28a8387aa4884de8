//! Password hashing for the credential store.
//!
//! Argon2id with a random salt per hash. Hashing is CPU-bound, so both
//! operations run on the blocking pool instead of a runtime worker.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

// Hash of a throwaway secret, built on first use. Never matches a login.
pub(crate) static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// Hashes `plain_text` into a PHC string.
pub async fn hash_password(plain_text: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_sync(&plain_text))
        .await
        .map_err(|e| AppError::internal(format!("hashing task failed: {}", e)))?
}

/// Compares `plain_text` with a stored PHC hash. A malformed stored hash is an
/// internal error, a mismatch is `Ok(false)`.
pub async fn verify_password(plain_text: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_sync(&plain_text, &hash))
        .await
        .map_err(|e| AppError::internal(format!("verification task failed: {}", e)))?
}

/// Spends one full verification on a throwaway hash, so rejecting an unknown
/// account costs the same as rejecting a wrong password.
pub async fn verify_dummy(plain_text: String) -> AppResult<()> {
    let hash = DUMMY_HASH
        .get_or_try_init(|| hash_password(Uuid::new_v4().to_string()))
        .await?
        .clone();
    verify_password(plain_text, hash).await.map(|_| ())
}

fn hash_sync(plain_text: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain_text.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("password hash failed: {}", e)))
}

fn verify_sync(plain_text: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(format!("invalid hash format: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(plain_text.as_bytes(), &parsed)
        .is_ok())
}
