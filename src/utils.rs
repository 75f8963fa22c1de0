use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

use crate::errors::{AppError, AppResult};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Password rules applied when an account is created from the CLI.
pub fn check_password_policy(password: &str) -> AppResult<()> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    if password.trim() != password {
        return Err(AppError::bad_request("password must not start or end with whitespace"));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> AppResult<String> {
    check_password_policy(password)?;

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))
}

/// Checks a login credential. Input longer than the policy allows never matches, so
/// oversized bodies are not fed to argon2.
pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    if password.is_empty() || password.chars().count() > MAX_PASSWORD_LENGTH {
        return Ok(false);
    }

    let parsed_hash = PasswordHash::new(password_hash).map_err(|err| {
        tracing::error!(error = %err, "stored password hash is malformed");
        AppError::internal("invalid password hash")
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_rejects_short_long_and_padded_passwords() {
        assert!(check_password_policy("short").is_err());
        assert!(check_password_policy(&"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
        assert!(check_password_policy(" S3cureP@ss").is_err());
        assert!(check_password_policy("S3cureP@ssw0rd").is_ok());
    }

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("S3cureP@ssw0rd").unwrap();
        assert!(verify_password("S3cureP@ssw0rd", &hash).unwrap());
        assert!(!verify_password("S3cureP@ssw0rD", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
        assert!(!verify_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1), &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_internal_error() {
        let err = verify_password("S3cureP@ssw0rd", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
