//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (derive client identity from proxy headers)
//!     → rate_limit.rs (exempt? strict or lenient bucket for client+path)
//!     → 429 on an empty bucket, otherwise on to authentication
//! Outgoing response:
//!     → headers.rs (security headers unless the path is exempt)
//! ```
//!
//! # Design Decisions
//! - Rate limiting runs before any authentication work
//! - Buckets live in an owned map injected into the server, no globals
//! - Fail closed: an empty bucket rejects without touching downstream

pub mod headers;
pub mod rate_limit;

pub use headers::{client_identity, SecurityHeaders};
pub use rate_limit::{Admission, BucketPolicy, PolicyTier, RateLimitKey, RateLimiter};
