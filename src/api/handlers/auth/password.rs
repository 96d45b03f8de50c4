//! Argon2id password hashing and verification.
//!
//! Hashing is CPU-bound and runs on the blocking thread pool so it never
//! stalls the async runtime. Verification is constant-time and returns
//! `false` on mismatch rather than an error.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a raw password with Argon2id and a fresh random salt.
///
/// # Errors
/// Returns an error if the hasher fails or the blocking task is cancelled.
pub async fn hash_password(raw: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(raw.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    })
    .await
    .context("password hashing task failed")?
}

/// Verify a candidate password against a stored hash.
///
/// Mismatches return `Ok(false)`; only a malformed stored hash or a
/// cancelled task is an error.
///
/// # Errors
/// Returns an error if the stored hash cannot be parsed.
pub async fn verify_password(stored_hash: String, candidate: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored_hash).map_err(|err| anyhow!("malformed password hash: {err}"))?;
        Ok(Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .context("password verification task failed")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn hash_then_verify_round_trip() -> Result<()> {
        let hash = hash_password("secret12".to_string()).await?;
        assert_ne!(hash, "secret12");
        assert!(hash.starts_with("$argon2"));

        assert!(verify_password(hash.clone(), "secret12".to_string()).await?);
        assert!(!verify_password(hash, "secret13".to_string()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn same_password_hashes_differently() -> Result<()> {
        let first = hash_password("secret12".to_string()).await?;
        let second = hash_password("secret12".to_string()).await?;
        // Fresh salt per hash.
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_stored_hash_is_an_error() {
        let result = verify_password("not-a-hash".to_string(), "secret12".to_string()).await;
        assert!(result.is_err());
    }
}
