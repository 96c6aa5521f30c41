//! Contact store calls routed through named circuit breakers.

use std::sync::Arc;

use super::store::{Contact, ContactStore};
use crate::resilience::{CircuitBreakerRegistry, ServiceUnavailable};

pub const CONTACT_SERVICE: &str = "contact-service";
pub const SEARCH_SERVICE: &str = "search-service";

pub const CONTACTS_UNAVAILABLE: &str = "Le service de contacts est temporairement indisponible";
pub const SEARCH_UNAVAILABLE: &str = "Le service de recherche est temporairement indisponible";

/// Breaker-wrapped view of a [`ContactStore`].
#[derive(Clone)]
pub struct GuardedContacts {
    store: Arc<dyn ContactStore>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl GuardedContacts {
    pub fn new(store: Arc<dyn ContactStore>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        // Register both breakers up front so they show in health output.
        breakers.breaker(CONTACT_SERVICE);
        breakers.breaker(SEARCH_SERVICE);
        Self { store, breakers }
    }

    pub async fn contacts_for(&self, owner: &str) -> Result<Vec<Contact>, ServiceUnavailable> {
        self.breakers
            .call(
                CONTACT_SERVICE,
                || self.store.contacts_for(owner),
                |error| {
                    tracing::warn!(owner = %owner, error = %error, "Contacts fallback");
                    ServiceUnavailable::new(CONTACTS_UNAVAILABLE)
                },
            )
            .await
    }

    pub async fn search(&self, owner: &str, query: &str) -> Result<Vec<Contact>, ServiceUnavailable> {
        self.breakers
            .call(
                SEARCH_SERVICE,
                || self.store.search(owner, query),
                |error| {
                    tracing::warn!(owner = %owner, query = %query, error = %error, "Search fallback");
                    ServiceUnavailable::new(SEARCH_UNAVAILABLE)
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::store::{InMemoryContactStore, StoreError};
    use crate::resilience::{BreakerSettings, CircuitState, RetryPolicy};
    use futures_util::future::{self, BoxFuture};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingFailure {
        calls: AtomicU32,
    }

    impl ContactStore for CountingFailure {
        fn contacts_for<'a>(&'a self, _owner: &'a str) -> BoxFuture<'a, Result<Vec<Contact>, StoreError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(future::ready(Err(StoreError::Query("connection reset".to_string()))))
        }

        fn search<'a>(
            &'a self,
            _owner: &'a str,
            _query: &'a str,
        ) -> BoxFuture<'a, Result<Vec<Contact>, StoreError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(future::ready(Err(StoreError::Query("connection reset".to_string()))))
        }
    }

    fn registry() -> Arc<CircuitBreakerRegistry> {
        Arc::new(CircuitBreakerRegistry::new(
            BreakerSettings::default(),
            RetryPolicy::none(),
            Duration::from_millis(200),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_values_through() {
        let store = Arc::new(InMemoryContactStore::new());
        store.add("alice", "Awa", "Ouedraogo", "+226 70 00 00 01", None);
        let guarded = GuardedContacts::new(store, registry());

        assert_eq!(guarded.contacts_for("alice").await.unwrap().len(), 1);
        assert_eq!(guarded.search("alice", "awa").await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_fall_back_and_open_the_breaker() {
        let store = Arc::new(CountingFailure::default());
        let breakers = registry();
        let guarded = GuardedContacts::new(store.clone(), breakers.clone());

        for _ in 0..3 {
            let fallback = guarded.contacts_for("alice").await.unwrap_err();
            assert_eq!(fallback.message, CONTACTS_UNAVAILABLE);
        }
        assert_eq!(breakers.state(CONTACT_SERVICE), CircuitState::Open);
        assert_eq!(breakers.state(SEARCH_SERVICE), CircuitState::Closed);

        // Open: the store is not called.
        let _ = guarded.contacts_for("alice").await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);

        let fallback = guarded.search("alice", "x").await.unwrap_err();
        assert_eq!(fallback.message, SEARCH_UNAVAILABLE);
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_breakers_registered_on_construction() {
        let breakers = registry();
        let _guarded = GuardedContacts::new(Arc::new(InMemoryContactStore::new()), breakers.clone());
        let snapshot = breakers.snapshot();
        assert!(snapshot.contains_key(CONTACT_SERVICE));
        assert!(snapshot.contains_key(SEARCH_SERVICE));
    }
}
