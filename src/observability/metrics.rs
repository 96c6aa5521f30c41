//! Metrics collection.
//!
//! # Metrics
//! - `gatekeeper_rate_limited_total` (counter): rejected requests by policy
//! - `gatekeeper_auth_login_total` (counter): login attempts by outcome
//! - `gatekeeper_auth_duration_seconds` (histogram): login handling latency
//! - `gatekeeper_registrations_total` (counter): accounts created
//! - `gatekeeper_breaker_transitions_total` (counter): state changes by operation
//! - `gatekeeper_breaker_fallbacks_total` (counter): fallbacks by operation and reason
//!
//! # Design Decisions
//! - Emitted through the `metrics` facade; no exporter is installed here
//! - Login counters are also kept in-process so handlers can be asserted on

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub fn record_rate_limited(policy: &'static str) {
    metrics::counter!("gatekeeper_rate_limited_total", "policy" => policy).increment(1);
}

pub fn record_login(outcome: &'static str) {
    metrics::counter!("gatekeeper_auth_login_total", "outcome" => outcome).increment(1);
}

pub fn record_auth_duration(start: Instant) {
    metrics::histogram!("gatekeeper_auth_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_registration() {
    metrics::counter!("gatekeeper_registrations_total").increment(1);
}

pub fn record_breaker_transition(name: &str, to: &'static str) {
    metrics::counter!(
        "gatekeeper_breaker_transitions_total",
        "name" => name.to_string(),
        "to" => to
    )
    .increment(1);
}

pub fn record_fallback(name: &str, reason: &'static str) {
    metrics::counter!(
        "gatekeeper_breaker_fallbacks_total",
        "name" => name.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// In-process authentication counters.
#[derive(Debug, Default)]
pub struct AuthCounters {
    login_attempts: AtomicU64,
    login_successes: AtomicU64,
    login_failures: AtomicU64,
    registrations: AtomicU64,
}

/// Point-in-time copy of [`AuthCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCountersSnapshot {
    pub login_attempts: u64,
    pub login_successes: u64,
    pub login_failures: u64,
    pub registrations: u64,
}

impl AuthCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_attempt(&self) {
        self.login_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_success(&self) {
        self.login_successes.fetch_add(1, Ordering::Relaxed);
        record_login("success");
    }

    pub fn login_failure(&self) {
        self.login_failures.fetch_add(1, Ordering::Relaxed);
        record_login("failure");
    }

    pub fn registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        record_registration();
    }

    pub fn snapshot(&self) -> AuthCountersSnapshot {
        AuthCountersSnapshot {
            login_attempts: self.login_attempts.load(Ordering::Relaxed),
            login_successes: self.login_successes.load(Ordering::Relaxed),
            login_failures: self.login_failures.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
        }
    }
}
