//! User Directory
//!
//! In-memory account store: registration and credential checks.
//! Passwords are kept only as salted digests.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::hash::{CredentialHasher, PasswordDigest};
use crate::network::protocol::{Credentials, Registration, User};

/// Authentication errors. Display strings are sent to the client verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A required field was blank.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    /// Username already registered.
    #[error("Username {0} is already taken")]
    UsernameTaken(String),
    /// Unknown user or wrong password.
    #[error("Invalid username or password")]
    InvalidCredentials,
}

/// A registered account.
#[derive(Debug, Clone)]
pub struct Account {
    /// Account name.
    pub username: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Stored password digest.
    digest: PasswordDigest,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

impl Account {
    /// Public view of the account. The hash never leaves the server.
    pub fn to_user(&self, is_available: bool) -> User {
        User {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            password_hash: None,
            is_available,
        }
    }
}

/// Registered accounts keyed by username.
pub struct UserDirectory {
    accounts: BTreeMap<String, Account>,
    hasher: CredentialHasher,
}

impl UserDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            accounts: BTreeMap::new(),
            hasher: CredentialHasher::for_passwords(),
        }
    }

    /// Register a new account.
    pub fn register(&mut self, registration: &Registration) -> Result<&Account, AuthError> {
        let username = registration.username.trim();
        let display_name = registration.display_name.trim();
        if username.is_empty() {
            return Err(AuthError::EmptyField("Username"));
        }
        if display_name.is_empty() {
            return Err(AuthError::EmptyField("Display name"));
        }
        if registration.password.is_empty() {
            return Err(AuthError::EmptyField("Password"));
        }
        if self.accounts.contains_key(username) {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        let account = Account {
            username: username.to_string(),
            display_name: display_name.to_string(),
            digest: self.hasher.digest(username, &registration.password),
            registered_at: Utc::now(),
        };
        Ok(self.accounts.entry(username.to_string()).or_insert(account))
    }

    /// Check credentials.
    pub fn verify(&self, credentials: &Credentials) -> Result<&Account, AuthError> {
        let username = credentials.username.trim();
        if username.is_empty() {
            return Err(AuthError::EmptyField("Username"));
        }
        if credentials.password.is_empty() {
            return Err(AuthError::EmptyField("Password"));
        }
        let account = self.accounts.get(username).ok_or(AuthError::InvalidCredentials)?;
        if self.hasher.verify(&account.digest, username, &credentials.password) {
            Ok(account)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Look up an account.
    pub fn get(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    /// Whether a username is registered.
    pub fn contains(&self, username: &str) -> bool {
        self.accounts.contains_key(username)
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// No accounts registered.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, password: &str) -> Registration {
        Registration {
            username: username.to_string(),
            display_name: format!("{} display", username),
            password: password.to_string(),
        }
    }

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials { username: username.to_string(), password: password.to_string() }
    }

    #[test]
    fn test_register_then_verify() {
        let mut directory = UserDirectory::new();
        directory.register(&registration("alice", "pw")).unwrap();

        let account = directory.verify(&credentials("alice", "pw")).unwrap();
        assert_eq!(account.display_name, "alice display");
        assert_eq!(directory.verify(&credentials("alice", "nope")).unwrap_err(), AuthError::InvalidCredentials);
        assert_eq!(directory.verify(&credentials("carol", "pw")).unwrap_err(), AuthError::InvalidCredentials);
    }

    #[test]
    fn test_duplicate_username() {
        let mut directory = UserDirectory::new();
        directory.register(&registration("alice", "pw")).unwrap();
        let err = directory.register(&registration("alice", "other")).unwrap_err();
        assert_eq!(err, AuthError::UsernameTaken("alice".to_string()));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_blank_fields_rejected() {
        let mut directory = UserDirectory::new();
        assert_eq!(
            directory.register(&registration("  ", "pw")).unwrap_err(),
            AuthError::EmptyField("Username")
        );
        assert_eq!(
            directory.verify(&credentials("alice", "")).unwrap_err(),
            AuthError::EmptyField("Password")
        );
        assert!(directory.is_empty());
    }

    #[test]
    fn test_public_user_hides_hash() {
        let mut directory = UserDirectory::new();
        let user = directory.register(&registration("alice", "pw")).unwrap().to_user(true);
        assert_eq!(user.password_hash, None);
        assert!(user.is_available);
    }
}
