// src/utils/crypto.rs
//! Password hashing for operator accounts.
//!
//! Uses PBKDF2-HMAC-SHA256 from `ring` with a random 16-byte salt per hash.
//! Verification goes through `ring::pbkdf2::verify`, which compares in
//! constant time.

use crate::error::{RegistryError, Result};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Iteration count used when none is configured.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// A salted password hash.
///
/// Salt and digest are stored base64-encoded so the value can be
/// serialized alongside the account it belongs to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    iterations: u32,
    salt: String,
    hash: String,
}

impl PasswordHash {
    /// Hashes `password` with a fresh salt.
    ///
    /// # Errors
    /// - `PasswordHash` if the iteration count is zero or the system RNG fails
    pub fn new(password: &str, iterations: u32) -> Result<Self> {
        let rounds = NonZeroU32::new(iterations).ok_or(RegistryError::PasswordHash)?;

        let mut salt = [0u8; SALT_LEN];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| RegistryError::PasswordHash)?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, rounds, &salt, password.as_bytes(), &mut hash);

        Ok(Self {
            iterations,
            salt: base64::encode(salt),
            hash: base64::encode(hash),
        })
    }

    /// Returns `true` if `password` produces this hash.
    ///
    /// A hash with corrupt encoding never verifies.
    pub fn verify(&self, password: &str) -> bool {
        let rounds = match NonZeroU32::new(self.iterations) {
            Some(rounds) => rounds,
            None => return false,
        };
        let (salt, hash) = match (base64::decode(&self.salt), base64::decode(&self.hash)) {
            (Ok(salt), Ok(hash)) => (salt, hash),
            _ => return false,
        };
        pbkdf2::verify(pbkdf2::PBKDF2_HMAC_SHA256, rounds, &salt, password.as_bytes(), &hash).is_ok()
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_only_original_password() {
        let hash = PasswordHash::new("uni2024", 1_000).unwrap();
        assert!(hash.verify("uni2024"));
        assert!(!hash.verify("uni2025"));
        assert!(!hash.verify(""));
    }

    #[test]
    fn test_salts_differ() {
        let a = PasswordHash::new("admin123", 1_000).unwrap();
        let b = PasswordHash::new("admin123", 1_000).unwrap();
        assert_ne!(a, b);
        assert!(a.verify("admin123") && b.verify("admin123"));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(matches!(
            PasswordHash::new("secret", 0),
            Err(RegistryError::PasswordHash)
        ));
    }

    #[test]
    fn test_debug_hides_digest() {
        let hash = PasswordHash::new("secret", 1_000).unwrap();
        let printed = format!("{:?}", hash);
        assert!(!printed.contains(&hash.hash));
    }
}
