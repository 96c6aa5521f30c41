//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded downstream call (registry.call(name, op, fallback)):
//!     → circuit_breaker.rs (Open? → fallback, nothing recorded)
//!     → timeouts.rs (attempt under a deadline, panics caught)
//!     → circuit_breaker.rs (record outcome, maybe transition)
//!     → On failure: retries.rs + backoff.rs (sleep, try again)
//!     → Out of attempts: fallback.rs (ServiceUnavailable for the caller)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every downstream attempt has a deadline
//! - Fallbacks are typed closures supplied at the call site
//! - Downstream failures never propagate past the breaker boundary

pub mod backoff;
pub mod circuit_breaker;
pub mod fallback;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerSettings, BreakerSnapshot, CallPermit, CircuitBreaker, CircuitBreakerRegistry,
    CircuitState,
};
pub use fallback::{DownstreamError, ServiceUnavailable};
pub use retries::RetryPolicy;
