//! Slow, salted password hashing.
//!
//! Hashes are PBKDF2-HMAC-SHA256 in PHC string format, e.g.
//! `$pbkdf2-sha256$i=100000,l=32$<salt>$<hash>`. The salt and round count are
//! part of the stored string, so changing the configured work factor never
//! invalidates existing hashes.

use super::error::{AuthError, Result};
use pbkdf2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use pbkdf2::{Algorithm, Params, Pbkdf2};

/// Default PBKDF2 rounds; roughly tens of milliseconds per hash on server hardware.
pub const DEFAULT_HASH_ROUNDS: u32 = 100_000;

/// Lower bound applied to any configured round count.
pub const MIN_HASH_ROUNDS: u32 = 1_000;

/// Salt byte length before base64 encoding.
const SALT_BYTES: usize = 16;

/// Derived key length in bytes.
const OUTPUT_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    rounds: u32,
    /// Hash of a throwaway password, verified against when the username is unknown.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(rounds: u32) -> Result<Self> {
        let rounds = rounds.max(MIN_HASH_ROUNDS);
        let mut hasher = Self {
            rounds,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash("fittrack-dummy-password")?;
        Ok(hasher)
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Hash `password` under a freshly generated random salt.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = generate_salt()?;
        let params = Params {
            rounds: self.rounds,
            output_length: OUTPUT_LENGTH,
        };
        let hash = Pbkdf2
            .hash_password_customized(
                password.as_bytes(),
                Some(Algorithm::Pbkdf2Sha256.ident()),
                None,
                params,
                &salt,
            )
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Check `password` against a stored PHC string.
    ///
    /// The digest comparison is constant-time. A stored value that does not
    /// parse never matches.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Stored password hash is malformed: {e}");
                return false;
            }
        };
        Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
    }

    /// Spend the same work as a real verification, then report no match.
    pub fn dummy_verify(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.dummy_hash);
        false
    }
}

fn generate_salt() -> Result<SaltString> {
    let bytes: [u8; SALT_BYTES] = rand::random();
    SaltString::encode_b64(&bytes).map_err(|e| AuthError::Hashing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_HASH_ROUNDS).unwrap()
    }

    #[test]
    fn hash_verifies_against_same_password() {
        let hasher = hasher();
        let hash = hasher.hash("secret1").unwrap();
        assert!(hasher.verify("secret1", &hash));
        assert!(!hasher.verify("secret2", &hash));
    }

    #[test]
    fn hash_is_phc_formatted_and_never_plaintext() {
        let hasher = hasher();
        let hash = hasher.hash("secret1").unwrap();
        assert!(hash.starts_with("$pbkdf2-sha256$"));
        assert!(hash.contains("i=1000"));
        assert!(!hash.contains("secret1"));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let hasher = hasher();
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("same-password", &a));
        assert!(hasher.verify("same-password", &b));
    }

    #[test]
    fn rounds_are_clamped_to_minimum() {
        let hasher = PasswordHasher::new(1).unwrap();
        assert_eq!(hasher.rounds(), MIN_HASH_ROUNDS);
    }

    #[test]
    fn hash_from_other_work_factor_still_verifies() {
        let old = PasswordHasher::new(MIN_HASH_ROUNDS).unwrap();
        let new = PasswordHasher::new(MIN_HASH_ROUNDS * 2).unwrap();
        let hash = old.hash("secret1").unwrap();
        assert!(new.verify("secret1", &hash));
    }

    #[test]
    fn malformed_stored_hash_never_matches() {
        let hasher = hasher();
        assert!(!hasher.verify("secret1", "not-a-phc-string"));
        assert!(!hasher.verify("", ""));
    }

    #[test]
    fn dummy_verify_is_always_false() {
        let hasher = hasher();
        assert!(!hasher.dummy_verify("fittrack-dummy-password"));
        assert!(!hasher.dummy_verify("anything"));
    }
}
