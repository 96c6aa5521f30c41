//! Downstream data capability.
//!
//! # Data Flow
//! ```text
//! Protected handler
//!     → guarded.rs (named breaker: contact-service / search-service)
//!     → store.rs (ContactStore implementation)
//!     → Vec<Contact> or ServiceUnavailable fallback
//! ```
//!
//! # Design Decisions
//! - The record store is an injected trait object; only its read path is used
//! - Fallback messages are fixed per operation and never call back into the store

pub mod guarded;
pub mod store;

pub use guarded::{GuardedContacts, CONTACT_SERVICE, SEARCH_SERVICE};
pub use store::{Contact, ContactStore, InMemoryContactStore, StoreError};
