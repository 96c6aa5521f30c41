//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gatekeeper.
//! All types derive Serde traits for deserialization from config files, and
//! every section defaults to the reference policy so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gatekeeper.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Deployment profile (controls the signing-secret policy).
    pub profile: Profile,

    /// Listener and request limits.
    pub server: ServerConfig,

    /// Token signing and lifetimes.
    pub auth: AuthConfig,

    /// Per-client, per-endpoint rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker settings shared by every guarded operation.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration for guarded downstream calls.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Dev,
    #[serde(alias = "production")]
    Prod,
}

impl Profile {
    pub fn is_production(self) -> bool {
        matches!(self, Profile::Prod)
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Profile::Dev),
            "prod" | "production" => Ok(Profile::Prod),
            other => Err(format!("unknown profile '{}'", other)),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (whole request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Token service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC signing secret. Must be at least 32 bytes in production.
    pub secret: String,

    /// Access token lifetime in seconds.
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: u64,

    /// `iss` claim written into every token.
    pub issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_ttl_secs: 24 * 3600,
            refresh_ttl_secs: 7 * 24 * 3600,
            issuer: "gatekeeper".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }
}

/// A single token-bucket policy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct BucketPolicyConfig {
    /// Maximum tokens held by the bucket.
    pub capacity: u64,

    /// Tokens added over one refill period.
    pub refill_tokens: u64,

    /// Refill period in seconds.
    pub refill_period_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Paths containing this marker get the strict policy.
    pub auth_marker: String,

    /// Policy for authentication endpoints.
    pub strict: BucketPolicyConfig,

    /// Policy for every other endpoint.
    pub lenient: BucketPolicyConfig,

    /// Path prefixes that bypass the limiter (and security headers).
    pub exempt_prefixes: Vec<String>,

    /// Evict buckets idle for this many seconds. 0 keeps buckets forever.
    pub idle_eviction_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth_marker: "/auth/".to_string(),
            strict: BucketPolicyConfig {
                capacity: 5,
                refill_tokens: 5,
                refill_period_secs: 60,
            },
            lenient: BucketPolicyConfig {
                capacity: 100,
                refill_tokens: 100,
                refill_period_secs: 60,
            },
            exempt_prefixes: vec![
                "/actuator".to_string(),
                "/swagger-ui".to_string(),
                "/v3/api-docs".to_string(),
                "/metrics".to_string(),
            ],
            idle_eviction_secs: 0,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of recent outcomes kept per operation.
    pub sliding_window_size: usize,

    /// Outcomes required before the failure rate is evaluated.
    pub minimum_calls: usize,

    /// Failure rate (percent) at which the breaker opens.
    pub failure_rate_threshold: f32,

    /// Time spent open before a trial call is allowed, in milliseconds.
    pub open_cooldown_ms: u64,

    /// Concurrent trial calls admitted while half-open.
    pub half_open_trial_calls: u32,

    /// Deadline for a single downstream attempt, in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 5,
            minimum_calls: 3,
            failure_rate_threshold: 50.0,
            open_cooldown_ms: 5000,
            half_open_trial_calls: 1,
            call_timeout_ms: 3000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "gatekeeper=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add security response headers to non-exempt responses.
    pub enable_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
        }
    }
}
