use anyhow::Context;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

use crate::errors::AppError;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials.")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

#[tracing::instrument(
    name = "Verify password hash",
    skip(expected_password_hash, password_candidate)
)]
pub fn verify_password_hash(
    expected_password_hash: &str,
    password_candidate: &str,
) -> Result<(), AuthError> {
    let expected_password_hash = PasswordHash::new(expected_password_hash)
        .context("Failed to parse hash in PHC string format.")?;

    Argon2::default()
        .verify_password(password_candidate.as_bytes(), &expected_password_hash)
        .context("Invalid password.")
        .map_err(AuthError::InvalidCredentials)
}

#[tracing::instrument(name = "Compute password hash", skip(password))]
pub async fn compute_password_hash(password: String) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut rand::thread_rng());

    let params = Params::new(15000, 2, 1, None).map_err(|e| {
        AppError::Unexpected(anyhow::Error::new(e).context("Failed to create Argon2 params"))
    })?;

    let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let password_hash = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!("Failed to hash password: {:?}", e);
            AppError::Unexpected(anyhow::Error::new(e).context("Failed to hash password"))
        })?
        .to_string();

    tracing::debug!("Password hash computed (length: {})", password_hash.len());
    Ok(password_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_verifies_against_the_original_password() {
        let hash = compute_password_hash("correct horse battery".to_string())
            .await
            .unwrap();
        assert!(verify_password_hash(&hash, "correct horse battery").is_ok());
    }

    #[tokio::test]
    async fn hash_rejects_a_different_password() {
        let hash = compute_password_hash("hunter2".to_string()).await.unwrap();
        let result = verify_password_hash(&hash, "hunter3");
        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn hash_is_salted_and_never_plaintext() {
        let first = compute_password_hash("swordfish".to_string()).await.unwrap();
        let second = compute_password_hash("swordfish".to_string()).await.unwrap();

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(!first.contains("swordfish"));
    }

    #[test]
    fn garbage_hash_is_rejected_not_panicked() {
        assert!(verify_password_hash("not-a-phc-string", "anything").is_err());
    }
}
