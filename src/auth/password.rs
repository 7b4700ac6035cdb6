//! Argon2 secret hashing

use crate::config::PasswordHashing;
use crate::core::error::ValidationError;
use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

pub const MIN_SECRET_LENGTH: usize = 8;

/// Hashes and verifies secrets as argon2id PHC strings
///
/// Holds a hash of a throwaway secret so that lookups of unknown identities
/// can spend the same verification time as real ones.
#[derive(Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl SecretHasher {
    pub fn new(cost: &PasswordHashing) -> anyhow::Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"gatehouse-timing-equalizer", &salt)
            .map_err(|e| anyhow!("Failed to hash dummy secret: {}", e))?
            .to_string();

        Ok(Self { argon2, dummy_hash })
    }

    /// Hash a secret with a fresh random salt
    pub fn hash(&self, secret: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow!("Failed to hash secret: {}", e))
    }

    /// Check a secret against a stored PHC string
    ///
    /// A malformed stored hash never verifies.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }

    /// Run a verification that always fails, for unknown identities
    pub fn verify_dummy(&self, secret: &str) {
        let _ = self.verify(secret, &self.dummy_hash);
    }
}

/// Password rule applied at registration and rotation
pub fn check_secret(field: &str, secret: &str) -> Result<(), ValidationError> {
    if secret.chars().count() < MIN_SECRET_LENGTH {
        return Err(ValidationError::single(
            field,
            format!("must be at least {} characters", MIN_SECRET_LENGTH),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> SecretHasher {
        SecretHasher::new(&PasswordHashing {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let hash = hasher.hash("correct horse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("wrong horse", &hash));
    }

    #[test]
    fn test_same_secret_gets_distinct_salts() {
        let hasher = hasher();
        assert_ne!(hasher.hash("secret123").unwrap(), hasher.hash("secret123").unwrap());
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!hasher().verify("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_check_secret_length() {
        assert!(check_secret("secret", "1234567").is_err());
        assert!(check_secret("secret", "12345678").is_ok());
        let err = check_secret("newSecret", "short").unwrap_err();
        assert!(err.has_field("newSecret"));
    }
}
