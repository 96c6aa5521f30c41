//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms via the metrics facade)
//!
//! Request correlation:
//!     → x-request-id set by tower-http and propagated to the response
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Security events (rejections, breaker transitions) logged at warn
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
