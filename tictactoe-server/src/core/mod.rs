//! Core primitives.
//!
//! Salted credential digests used by the user directory.

pub mod hash;

// Re-export core types
pub use hash::{CredentialHasher, PasswordDigest};
