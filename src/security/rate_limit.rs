//! Per-client, per-endpoint rate limiting with two policy tiers.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{BucketPolicyConfig, RateLimitConfig};
use crate::http::response::ErrorBody;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::security::headers::{is_exempt, request_client_identity};

/// A bucket policy: `capacity` tokens, refilled continuously at
/// `refill_tokens` per `refill_period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPolicy {
    pub capacity: u64,
    pub refill_tokens: u64,
    pub refill_period: Duration,
}

impl BucketPolicy {
    pub const fn new(capacity: u64, refill_tokens: u64, refill_period: Duration) -> Self {
        Self {
            capacity,
            refill_tokens,
            refill_period,
        }
    }

    /// Units making up one token. Tokens are tracked in these units so a
    /// partial refill is exact.
    fn units_per_token(&self) -> u128 {
        self.refill_period.as_nanos().max(1)
    }

    fn max_units(&self) -> u128 {
        self.capacity as u128 * self.units_per_token()
    }
}

impl From<BucketPolicyConfig> for BucketPolicy {
    fn from(config: BucketPolicyConfig) -> Self {
        Self::new(
            config.capacity,
            config.refill_tokens,
            Duration::from_secs(config.refill_period_secs),
        )
    }
}

/// Which policy tier a path falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyTier {
    Strict,
    Lenient,
}

impl PolicyTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyTier::Strict => "strict",
            PolicyTier::Lenient => "lenient",
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Path bypasses the limiter.
    Exempt,
    Admitted(PolicyTier),
    Rejected(PolicyTier),
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Admission::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub client: String,
    pub path: String,
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.path)
    }
}

/// A token bucket with lazy refill.
#[derive(Debug)]
struct TokenBucket {
    units: u128,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(policy: &BucketPolicy, now: Instant) -> Self {
        Self {
            units: policy.max_units(),
            last_refill: now,
        }
    }

    /// Units the bucket would hold at `now`, capped at capacity.
    fn units_at(&self, policy: &BucketPolicy, now: Instant) -> u128 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        let refill = elapsed.saturating_mul(policy.refill_tokens as u128);
        self.units.saturating_add(refill).min(policy.max_units())
    }

    /// An evictable bucket: idle for `max_idle` and already refilled to
    /// capacity, so recreating it full grants nothing extra.
    fn is_evictable(&self, policy: &BucketPolicy, now: Instant, max_idle: Duration) -> bool {
        now.saturating_duration_since(self.last_refill) >= max_idle
            && self.units_at(policy, now) >= policy.max_units()
    }

    fn try_acquire(&mut self, policy: &BucketPolicy, now: Instant) -> bool {
        self.units = self.units_at(policy, now);
        self.last_refill = now;

        let cost = policy.units_per_token();
        if self.units >= cost {
            self.units -= cost;
            true
        } else {
            false
        }
    }
}

/// Owner of every bucket. Each key's bucket is created on first use.
pub struct RateLimiter {
    buckets: DashMap<RateLimitKey, TokenBucket>,
    enabled: bool,
    auth_marker: String,
    strict: BucketPolicy,
    lenient: BucketPolicy,
    exempt_prefixes: Vec<String>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            enabled: config.enabled,
            auth_marker: config.auth_marker.clone(),
            strict: config.strict.into(),
            lenient: config.lenient.into(),
            exempt_prefixes: config.exempt_prefixes.clone(),
        }
    }

    pub fn exempt_prefixes(&self) -> &[String] {
        &self.exempt_prefixes
    }

    /// Policy tier for a path.
    pub fn tier_for(&self, path: &str) -> PolicyTier {
        if path.contains(self.auth_marker.as_str()) {
            PolicyTier::Strict
        } else {
            PolicyTier::Lenient
        }
    }

    fn policy(&self, tier: PolicyTier) -> &BucketPolicy {
        match tier {
            PolicyTier::Strict => &self.strict,
            PolicyTier::Lenient => &self.lenient,
        }
    }

    /// Consume one token for `(client, path)` if one is available.
    ///
    /// Never blocks on I/O; contention is limited to the key's map shard.
    pub fn check(&self, client: &str, path: &str) -> Admission {
        if !self.enabled || is_exempt(path, &self.exempt_prefixes) {
            return Admission::Exempt;
        }

        let tier = self.tier_for(path);
        let policy = self.policy(tier);
        let now = Instant::now();
        let key = RateLimitKey {
            client: client.to_string(),
            path: path.to_string(),
        };

        // The entry guard holds the shard lock across get-or-create and the
        // decrement.
        let admitted = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::full(policy, now))
            .try_acquire(policy, now);

        if admitted {
            Admission::Admitted(tier)
        } else {
            Admission::Rejected(tier)
        }
    }

    /// `true` if the request may proceed.
    pub fn admit(&self, client: &str, path: &str) -> bool {
        self.check(client, path).is_allowed()
    }

    /// Number of buckets currently held.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets untouched for at least `max_idle` whose refill has
    /// reached capacity. A partially drained bucket is kept however long it
    /// idles. Returns how many were removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|key, bucket| {
            let policy = self.policy(self.tier_for(&key.path));
            !bucket.is_evictable(policy, now, max_idle)
        });
        before.saturating_sub(self.buckets.len())
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("strict", &self.strict)
            .field("lenient", &self.lenient)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

/// Periodically evict buckets idle for `max_idle` until shutdown.
pub fn spawn_idle_sweeper(
    limiter: Arc<RateLimiter>,
    max_idle: Duration,
    mut shutdown: ShutdownSignal,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(max_idle);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = limiter.evict_idle(max_idle);
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = limiter.tracked_keys(), "Evicted idle rate-limit buckets");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

/// Middleware rejecting requests over their bucket with 429.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request_client_identity(&request);
    let path = request.uri().path().to_string();

    match limiter.check(&client, &path) {
        Admission::Rejected(tier) => {
            tracing::warn!(client = %client, path = %path, policy = tier.as_str(), "Rate limit exceeded");
            metrics::record_rate_limited(tier.as_str());
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody::new("Too many requests")),
            )
                .into_response()
        }
        _ => next.run(request).await,
    }
}
