//! Contact store capability and an in-memory implementation.

use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Contact {
    /// Case-insensitive match on names, phone number and email.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [
            Some(self.first_name.as_str()),
            Some(self.last_name.as_str()),
            Some(self.phone_number.as_str()),
            self.email.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("contact store unavailable: {0}")]
    Unavailable(String),

    #[error("contact query failed: {0}")]
    Query(String),
}

/// Read access to the contacts owned by a user.
pub trait ContactStore: Send + Sync {
    fn contacts_for<'a>(&'a self, owner: &'a str) -> BoxFuture<'a, Result<Vec<Contact>, StoreError>>;

    fn search<'a>(
        &'a self,
        owner: &'a str,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Contact>, StoreError>>;
}

/// Contacts kept per owner in memory.
#[derive(Debug)]
pub struct InMemoryContactStore {
    contacts: DashMap<String, Vec<Contact>>,
    next_id: AtomicU64,
    available: AtomicBool,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self {
            contacts: DashMap::new(),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    pub fn add(
        &self,
        owner: &str,
        first_name: &str,
        last_name: &str,
        phone_number: &str,
        email: Option<&str>,
    ) -> Contact {
        let contact = Contact {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            phone_number: phone_number.to_string(),
            email: email.map(str::to_string),
        };
        self.contacts
            .entry(owner.to_string())
            .or_default()
            .push(contact.clone());
        contact
    }

    /// Simulate an outage: every query fails while false.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn query<F>(&self, owner: &str, keep: F) -> Result<Vec<Contact>, StoreError>
    where
        F: Fn(&Contact) -> bool,
    {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store disabled".to_string()));
        }
        Ok(self
            .contacts
            .get(owner)
            .map(|list| list.iter().filter(|c| keep(c)).cloned().collect())
            .unwrap_or_default())
    }
}

impl Default for InMemoryContactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactStore for InMemoryContactStore {
    fn contacts_for<'a>(&'a self, owner: &'a str) -> BoxFuture<'a, Result<Vec<Contact>, StoreError>> {
        Box::pin(future::ready(self.query(owner, |_| true)))
    }

    fn search<'a>(
        &'a self,
        owner: &'a str,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Contact>, StoreError>> {
        Box::pin(future::ready(self.query(owner, |c| c.matches(query))))
    }
}
