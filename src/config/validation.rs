//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, window sizes, thresholds)
//! - Enforce the signing-secret policy per deployment profile
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatekeeperConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{BucketPolicyConfig, GatekeeperConfig, Profile};

/// Minimum secret length accepted in production (256 bits).
pub const MIN_SECRET_BYTES: usize = 32;

/// Secret used in development when none is configured. Never valid in production.
pub const INSECURE_DEV_SECRET: &str = "gatekeeper-insecure-development-secret-change-me";

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("circuit_breaker.minimum_calls ({minimum}) exceeds sliding_window_size ({window})")]
    MinimumCallsExceedsWindow { minimum: usize, window: usize },

    #[error("circuit_breaker.failure_rate_threshold must be within (0, 100], got {0}")]
    FailureRateOutOfRange(String),

    #[error("auth.refresh_ttl_secs ({refresh}) must exceed auth.access_ttl_secs ({access})")]
    RefreshNotLongerThanAccess { access: u64, refresh: u64 },

    #[error("server.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("signing secret is missing or shorter than 32 bytes in production")]
    WeakSecret,
}

/// Check every semantic rule and collect all violations.
pub fn validate_config(config: &GatekeeperConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.server.bind_address.clone()));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "server.request_timeout_secs".into() });
    }

    if config.auth.access_ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "auth.access_ttl_secs".into() });
    }
    if config.auth.refresh_ttl_secs <= config.auth.access_ttl_secs {
        errors.push(ValidationError::RefreshNotLongerThanAccess {
            access: config.auth.access_ttl_secs,
            refresh: config.auth.refresh_ttl_secs,
        });
    }

    check_policy(&config.rate_limit.strict, "rate_limit.strict", &mut errors);
    check_policy(&config.rate_limit.lenient, "rate_limit.lenient", &mut errors);

    let cb = &config.circuit_breaker;
    if cb.sliding_window_size == 0 {
        errors.push(ValidationError::Zero { field: "circuit_breaker.sliding_window_size".into() });
    }
    if cb.minimum_calls == 0 {
        errors.push(ValidationError::Zero { field: "circuit_breaker.minimum_calls".into() });
    }
    if cb.minimum_calls > cb.sliding_window_size {
        errors.push(ValidationError::MinimumCallsExceedsWindow {
            minimum: cb.minimum_calls,
            window: cb.sliding_window_size,
        });
    }
    if !(cb.failure_rate_threshold > 0.0 && cb.failure_rate_threshold <= 100.0) {
        errors.push(ValidationError::FailureRateOutOfRange(cb.failure_rate_threshold.to_string()));
    }
    if cb.half_open_trial_calls == 0 {
        errors.push(ValidationError::Zero { field: "circuit_breaker.half_open_trial_calls".into() });
    }
    if cb.call_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "circuit_breaker.call_timeout_ms".into() });
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::Zero { field: "retries.max_attempts".into() });
    }

    if config.profile.is_production() && config.auth.secret.len() < MIN_SECRET_BYTES {
        errors.push(ValidationError::WeakSecret);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_policy(policy: &BucketPolicyConfig, name: &str, errors: &mut Vec<ValidationError>) {
    if policy.capacity == 0 {
        errors.push(ValidationError::Zero { field: format!("{}.capacity", name) });
    }
    if policy.refill_tokens == 0 {
        errors.push(ValidationError::Zero { field: format!("{}.refill_tokens", name) });
    }
    if policy.refill_period_secs == 0 {
        errors.push(ValidationError::Zero { field: format!("{}.refill_period_secs", name) });
    }
}

/// Pick the secret the token service will sign with.
///
/// Production refuses a missing or short secret. Development falls back to
/// [`INSECURE_DEV_SECRET`] with a warning.
pub fn resolve_signing_secret(configured: &str, profile: Profile) -> Result<String, ValidationError> {
    if profile.is_production() {
        if configured.len() < MIN_SECRET_BYTES {
            return Err(ValidationError::WeakSecret);
        }
        return Ok(configured.to_string());
    }

    if configured.is_empty() {
        tracing::warn!(
            "No signing secret configured. Using insecure development secret; set auth.secret or GATEKEEPER_SECRET"
        );
        return Ok(INSECURE_DEV_SECRET.to_string());
    }
    if configured.len() < MIN_SECRET_BYTES {
        tracing::warn!(
            length = configured.len(),
            "Signing secret is shorter than 256 bits; this would be refused in production"
        );
    }
    Ok(configured.to_string())
}
