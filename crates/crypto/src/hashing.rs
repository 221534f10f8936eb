use crate::error::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a value that must be comparable but never recoverable (backup
/// codes, SMS OTPs, API secrets). Argon2 with a random salt.
pub fn hash_secret(value: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();

    let hash = argon2.hash_password(value.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a value against a stored salted hash.
pub fn verify_secret(value: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)?;

    Ok(Argon2::default()
        .verify_password(value.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("482913").unwrap();
        assert!(verify_secret("482913", &hash).unwrap());
        assert!(!verify_secret("482914", &hash).unwrap());
    }

    #[test]
    fn test_salted() {
        let a = hash_secret("482913").unwrap();
        let b = hash_secret("482913").unwrap();
        assert_ne!(a, b);
    }
}
