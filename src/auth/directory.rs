//! User directory capability.
//!
//! The gatekeeper only needs three questions answered about users; the
//! record store behind them is an external collaborator. The in-memory
//! implementation backs the server binary and the tests.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("user '{0}' already exists")]
    AlreadyExists(String),

    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// Lookup and creation of user accounts.
pub trait UserDirectory: Send + Sync {
    /// `Ok(false)` for an unknown user or a wrong password.
    fn verify_credentials<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<bool, DirectoryError>>;

    fn exists<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<bool, DirectoryError>>;

    fn create_user<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<(), DirectoryError>>;
}

#[derive(Debug)]
struct StoredCredential {
    salt: String,
    digest: String,
}

impl StoredCredential {
    fn new(password: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = digest(&salt, password);
        Self { salt, digest }
    }

    fn matches(&self, password: &str) -> bool {
        digest(&self.salt, password) == self.digest
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Process-local directory keeping salted SHA-256 digests.
#[derive(Debug)]
pub struct InMemoryDirectory {
    users: DashMap<String, StoredCredential>,
    available: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Builder-style seeding.
    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.users
            .insert(username.to_string(), StoredCredential::new(password));
        self
    }

    /// Simulate an outage: every call fails with `Unavailable` while false.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn ensure_available(&self) -> Result<(), DirectoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable("in-memory directory disabled".to_string()))
        }
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDirectory for InMemoryDirectory {
    fn verify_credentials<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<bool, DirectoryError>> {
        let result = self.ensure_available().map(|()| {
            self.users
                .get(username)
                .map(|stored| stored.matches(password))
                .unwrap_or(false)
        });
        Box::pin(future::ready(result))
    }

    fn exists<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<bool, DirectoryError>> {
        let result = self
            .ensure_available()
            .map(|()| self.users.contains_key(username));
        Box::pin(future::ready(result))
    }

    fn create_user<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<(), DirectoryError>> {
        let result = self.ensure_available().and_then(|()| {
            match self.users.entry(username.to_string()) {
                Entry::Occupied(_) => Err(DirectoryError::AlreadyExists(username.to_string())),
                Entry::Vacant(slot) => {
                    slot.insert(StoredCredential::new(password));
                    Ok(())
                }
            }
        });
        Box::pin(future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_verify_credentials() {
        let directory = InMemoryDirectory::new().with_user("alice", "wonderland");

        assert_eq!(directory.verify_credentials("alice", "wonderland").await, Ok(true));
        assert_eq!(directory.verify_credentials("alice", "wrong").await, Ok(false));
        assert_eq!(directory.verify_credentials("bob", "wonderland").await, Ok(false));
    }

    #[tokio::test]
    async fn test_create_user_is_unique() {
        let directory = InMemoryDirectory::new();
        assert_eq!(directory.create_user("bob", "pw").await, Ok(()));
        assert_eq!(
            directory.create_user("bob", "other").await,
            Err(DirectoryError::AlreadyExists("bob".to_string()))
        );
        assert_eq!(directory.exists("bob").await, Ok(true));
        assert_eq!(directory.verify_credentials("bob", "pw").await, Ok(true));
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_passwords_are_not_stored_in_clear() {
        let directory = InMemoryDirectory::new().with_user("alice", "wonderland");
        let stored = directory.users.get("alice").unwrap();
        assert_ne!(stored.digest, "wonderland");
        assert_eq!(stored.digest.len(), 64);
    }

    #[tokio::test]
    async fn test_outage() {
        let directory = InMemoryDirectory::new().with_user("alice", "pw");
        directory.set_available(false);
        assert!(matches!(
            directory.exists("alice").await,
            Err(DirectoryError::Unavailable(_))
        ));
        directory.set_available(true);
        assert_eq!(directory.exists("alice").await, Ok(true));
    }
}
