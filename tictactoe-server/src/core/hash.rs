//! Credential Hashing
//!
//! Salted SHA-256 digests for stored passwords. Plain passwords only ever
//! exist in the LOGIN/REGISTER request body and are never kept.

use rand::RngCore;
use sha2::{Sha256, Digest};

/// Length of the random salt in bytes.
pub const SALT_LEN: usize = 16;

/// Stored form of a password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordDigest {
    /// Hex-encoded salt.
    pub salt: String,
    /// Hex-encoded SHA-256 of domain || salt || username || password.
    pub hash: String,
}

/// Hasher with a domain separator.
///
/// The username is folded into the digest so identical passwords of
/// different users never share a hash even with a colliding salt.
pub struct CredentialHasher {
    domain: &'static [u8],
}

impl CredentialHasher {
    /// Create a hasher for a given domain.
    pub const fn new(domain: &'static [u8]) -> Self {
        Self { domain }
    }

    /// Hasher used for account passwords.
    pub const fn for_passwords() -> Self {
        Self::new(b"TICTACTOE_PASSWORD_V1")
    }

    /// Digest a password with a fresh random salt.
    pub fn digest(&self, username: &str, password: &str) -> PasswordDigest {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = hex::encode(salt);
        let hash = self.hash_with_salt(&salt, username, password);
        PasswordDigest { salt, hash }
    }

    /// Recompute the hash for a stored salt.
    pub fn hash_with_salt(&self, salt: &str, username: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.domain);
        hasher.update(salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(username.as_bytes());
        hasher.update([0u8]);
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check a password against a stored digest.
    pub fn verify(&self, digest: &PasswordDigest, username: &str, password: &str) -> bool {
        let candidate = self.hash_with_salt(&digest.salt, username, password);
        // compare every byte regardless of where the first mismatch is
        candidate.len() == digest.hash.len()
            && candidate
                .bytes()
                .zip(digest.hash.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}
