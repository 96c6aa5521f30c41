//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and outcomes are recorded
//! - Open: downstream assumed down, calls fail fast to the fallback
//! - Half-Open: a limited number of trial calls test for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure rate >= threshold once the window holds minimum_calls
//! Open → Half-Open: on the first acquire after the cooldown
//! Half-Open → Closed: a trial succeeds (window cleared)
//! Half-Open → Open: a trial fails (cooldown restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per named operation, created lazily in a registry
//! - Transition and recording share one lock, so concurrent failures
//!   cannot each decide a transition
//! - Every transition bumps a generation; outcomes from an older
//!   generation are discarded
//! - Fail fast in Open state; rejected calls record nothing

use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::fallback::DownstreamError;
use super::retries::RetryPolicy;
use super::timeouts::run_attempt;
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds shared by every breaker in a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSettings {
    pub window_size: usize,
    pub minimum_calls: usize,
    /// Percent, in (0, 100].
    pub failure_rate_threshold: f32,
    pub open_cooldown: Duration,
    pub half_open_trial_calls: u32,
}

impl BreakerSettings {
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self {
            window_size: config.sliding_window_size.max(1),
            minimum_calls: config.minimum_calls.max(1),
            failure_rate_threshold: config.failure_rate_threshold,
            open_cooldown: Duration::from_millis(config.open_cooldown_ms),
            half_open_trial_calls: config.half_open_trial_calls.max(1),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default())
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    /// `None` until the window holds `minimum_calls` outcomes.
    pub failure_rate: Option<f32>,
}

struct BreakerInner {
    state: CircuitState,
    /// `true` marks a failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    generation: u64,
}

/// State machine for one named downstream operation.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(settings.window_size),
                opened_at: None,
                half_open_in_flight: 0,
                generation: 0,
            }),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying a due Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.promote_if_cooled(&mut inner);
        inner.state
    }

    /// Ask to attempt a call. The returned permit must be settled with
    /// [`CallPermit::record_success`] or [`CallPermit::record_failure`];
    /// dropping it unsettled records nothing.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, DownstreamError> {
        let mut inner = self.lock();
        self.promote_if_cooled(&mut inner);

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => return Err(self.open_error()),
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight >= self.settings.half_open_trial_calls {
                    return Err(self.open_error());
                }
                inner.half_open_in_flight += 1;
                true
            }
        };

        Ok(CallPermit {
            breaker: Arc::clone(self),
            generation: inner.generation,
            trial,
            settled: false,
        })
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        self.promote_if_cooled(&mut inner);

        let buffered = inner.window.len();
        let failed = inner.window.iter().filter(|failed| **failed).count();
        let failure_rate = (buffered >= self.settings.minimum_calls)
            .then(|| failed as f32 * 100.0 / buffered as f32);

        BreakerSnapshot {
            state: inner.state,
            buffered_calls: buffered,
            failed_calls: failed,
            failure_rate,
        }
    }

    fn record(&self, generation: u64, trial: bool, failed: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(name = %self.name, "Discarding outcome from earlier breaker state");
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.window.push_back(failed);
                while inner.window.len() > self.settings.window_size {
                    inner.window.pop_front();
                }
                if inner.window.len() >= self.settings.minimum_calls {
                    let failures = inner.window.iter().filter(|f| **f).count();
                    let rate = failures as f32 * 100.0 / inner.window.len() as f32;
                    if rate >= self.settings.failure_rate_threshold {
                        tracing::warn!(
                            name = %self.name,
                            failure_rate = rate,
                            "Circuit opened"
                        );
                        self.transition(&mut inner, CircuitState::Open);
                    }
                }
            }
            CircuitState::HalfOpen => {
                if trial {
                    inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                }
                if failed {
                    tracing::warn!(name = %self.name, "Trial call failed, circuit re-opened");
                    self.transition(&mut inner, CircuitState::Open);
                } else {
                    tracing::info!(name = %self.name, "Trial call succeeded, circuit closed");
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn release_trial(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn promote_if_cooled(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled = inner
            .opened_at
            .map_or(true, |at| at.elapsed() >= self.settings.open_cooldown);
        if cooled {
            tracing::info!(name = %self.name, "Cooldown elapsed, circuit half-open");
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        inner.state = to;
        inner.generation += 1;
        inner.half_open_in_flight = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                inner.window.clear();
                inner.opened_at = None;
            }
            CircuitState::HalfOpen => {}
        }
        metrics::record_breaker_transition(&self.name, to.as_str());
    }

    fn open_error(&self) -> DownstreamError {
        DownstreamError::CircuitOpen {
            name: self.name.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Poisoning only means a panic elsewhere; the state itself is intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.lock().state)
            .finish()
    }
}

/// Permission to attempt one call, tied to the breaker state it was granted in.
///
/// Dropping a permit without settling it releases any half-open trial slot.
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record(self.generation, self.trial, false);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.record(self.generation, self.trial, true);
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(self.generation);
        }
    }
}

/// All breakers of one gatekeeper, plus the retry and timeout policy
/// applied by [`CircuitBreakerRegistry::call`].
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: BreakerSettings,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: BreakerSettings, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
            retry,
            call_timeout,
        }
    }

    pub fn from_config(breaker: &CircuitBreakerConfig, retry: RetryPolicy) -> Self {
        Self::new(
            BreakerSettings::from_config(breaker),
            retry,
            Duration::from_millis(breaker.call_timeout_ms),
        )
    }

    /// Get or create the breaker for `name`.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.settings.clone())))
            .value()
            .clone()
    }

    pub fn state(&self, name: &str) -> CircuitState {
        self.breaker(name).state()
    }

    /// Every known breaker, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Run `operation` through the named breaker.
    ///
    /// Each attempt is bounded by the call timeout, and panics are caught.
    /// Failed attempts are recorded and retried with backoff while the retry
    /// budget lasts and the breaker admits them. When no value can be
    /// produced, `fallback` receives the last error and its result is
    /// returned as `Err`.
    pub async fn call<T, E, F, Fut, R, FB>(
        &self,
        name: &str,
        mut operation: F,
        fallback: FB,
    ) -> Result<T, R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        FB: FnOnce(DownstreamError) -> R,
    {
        let breaker = self.breaker(name);
        let mut attempt = 0u32;
        let mut last_error = None;

        loop {
            attempt += 1;

            let permit = match breaker.try_acquire() {
                Ok(permit) => permit,
                Err(rejected) => {
                    // A retry refused by the breaker reports the failure that opened it.
                    let cause = last_error.unwrap_or(rejected);
                    tracing::debug!(name = %name, attempt, cause = %cause, "Circuit open, using fallback");
                    metrics::record_fallback(name, cause.reason());
                    return Err(fallback(cause));
                }
            };

            match run_attempt(self.call_timeout, operation()).await {
                Ok(value) => {
                    permit.record_success();
                    return Ok(value);
                }
                Err(error) => {
                    permit.record_failure();
                    tracing::warn!(name = %name, attempt, error = %error, "Downstream call failed");

                    if !self.retry.should_retry(attempt) {
                        metrics::record_fallback(name, error.reason());
                        return Err(fallback(error));
                    }
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    last_error = Some(error);
                }
            }
        }
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers.len())
            .field("settings", &self.settings)
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::ServiceUnavailable;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn registry(retry: RetryPolicy) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(BreakerSettings::default(), retry, Duration::from_millis(100))
    }

    async fn fail(registry: &CircuitBreakerRegistry, calls: &AtomicU32) -> Result<u32, ServiceUnavailable> {
        registry
            .call(
                "contact-service",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>("connection refused")
                },
                |_| ServiceUnavailable::new("indisponible"),
            )
            .await
    }

    async fn succeed(registry: &CircuitBreakerRegistry, calls: &AtomicU32) -> Result<u32, ServiceUnavailable> {
        registry
            .call(
                "contact-service",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(7)
                },
                |_| ServiceUnavailable::new("indisponible"),
            )
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_open_the_circuit() {
        let registry = registry(RetryPolicy::none());
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            assert!(fail(&registry, &calls).await.is_err());
            assert_eq!(registry.state("contact-service"), CircuitState::Closed);
        }
        assert!(fail(&registry, &calls).await.is_err());
        assert_eq!(registry.state("contact-service"), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Open: fallback without touching the operation.
        let result = succeed(&registry, &calls).await;
        assert_eq!(result.unwrap_err().message, "indisponible");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_then_successful_trial_closes() {
        let registry = registry(RetryPolicy::none());
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = fail(&registry, &calls).await;
        }
        assert_eq!(registry.state("contact-service"), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert_eq!(registry.state("contact-service"), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(registry.state("contact-service"), CircuitState::HalfOpen);

        assert_eq!(succeed(&registry, &calls).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let snapshot = registry.breaker("contact-service").snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.buffered_calls, 0);
        assert_eq!(snapshot.failure_rate, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_and_restarts_cooldown() {
        let registry = registry(RetryPolicy::none());
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = fail(&registry, &calls).await;
        }

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(fail(&registry, &calls).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(registry.state("contact-service"), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(registry.state("contact-service"), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(registry.state("contact-service"), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_uses_sliding_window() {
        let registry = registry(RetryPolicy::none());
        let calls = AtomicU32::new(0);

        // S S F S F: 2/5 = 40% stays closed.
        let _ = succeed(&registry, &calls).await;
        let _ = succeed(&registry, &calls).await;
        let _ = fail(&registry, &calls).await;
        let _ = succeed(&registry, &calls).await;
        let _ = fail(&registry, &calls).await;
        assert_eq!(registry.state("contact-service"), CircuitState::Closed);

        // Window slides to S F S F F: 60% opens.
        let _ = fail(&registry, &calls).await;
        let snapshot = registry.breaker("contact-service").snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.buffered_calls, 5);
        assert_eq!(snapshot.failed_calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let registry = registry(RetryPolicy::none());
        let mut last = None;

        for _ in 0..3 {
            let result = registry
                .call(
                    "search-service",
                    || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok::<_, String>(())
                    },
                    |error| error,
                )
                .await;
            last = result.err();
        }

        assert_eq!(last, Some(DownstreamError::Timeout(Duration::from_millis(100))));
        assert_eq!(registry.state("search-service"), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_caught_and_recorded() {
        let registry = registry(RetryPolicy::none());
        let result = registry
            .call(
                "contact-service",
                || async {
                    if true {
                        panic!("store exploded");
                    }
                    Ok::<u8, String>(0)
                },
                |error| error,
            )
            .await;

        assert!(matches!(result, Err(DownstreamError::Thrown(_))));
        assert_eq!(registry.breaker("contact-service").snapshot().failed_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let registry = registry(RetryPolicy::default());
        let calls = AtomicU32::new(0);

        let result = registry
            .call(
                "contact-service",
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err("transient".to_string())
                    } else {
                        Ok(1)
                    }
                },
                |error| error,
            )
            .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let snapshot = registry.breaker("contact-service").snapshot();
        assert_eq!(snapshot.buffered_calls, 2);
        assert_eq!(snapshot.failed_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_when_circuit_opens() {
        let registry = CircuitBreakerRegistry::new(
            BreakerSettings::default(),
            RetryPolicy {
                max_attempts: 10,
                base_delay_ms: 10,
                max_delay_ms: 10,
            },
            Duration::from_millis(100),
        );
        let calls = AtomicU32::new(0);

        let result = fail(&registry, &calls).await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(registry.state("contact-service"), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_refused_by_breaker_reports_last_failure() {
        let registry = registry(RetryPolicy::default());
        for _ in 0..3 {
            let permit = registry.breaker("contact-service").try_acquire().unwrap();
            permit.record_failure();
        }
        tokio::time::advance(Duration::from_secs(5)).await;

        // The half-open trial fails, so the retry that follows is refused.
        let calls = AtomicU32::new(0);
        let result = registry
            .call(
                "contact-service",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u8, _>("still down")
                },
                |error| error,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(DownstreamError::Thrown(ref msg)) if msg.contains("still down")));
        assert_eq!(registry.state("contact-service"), CircuitState::Open);

        // A call that never ran still reports the open circuit.
        let result = registry
            .call("contact-service", || async { Ok::<u8, String>(1) }, |error| error)
            .await;
        assert!(matches!(result, Err(DownstreamError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_limited_trials() {
        let breaker = Arc::new(CircuitBreaker::new("contact-service", BreakerSettings::default()));
        for _ in 0..3 {
            breaker.try_acquire().unwrap().record_failure();
        }
        tokio::time::advance(Duration::from_secs(5)).await;

        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert!(matches!(
            breaker.try_acquire(),
            Err(DownstreamError::CircuitOpen { .. })
        ));

        // An abandoned trial frees its slot.
        drop(trial);
        let trial = breaker.try_acquire().unwrap();
        trial.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outcome_is_discarded() {
        let breaker = Arc::new(CircuitBreaker::new("contact-service", BreakerSettings::default()));
        let slow = breaker.try_acquire().unwrap();
        for _ in 0..3 {
            breaker.try_acquire().unwrap().record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        slow.record_success();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().buffered_calls, 3);
    }

    #[test]
    fn test_concurrent_failures_transition_once() {
        let breaker = Arc::new(CircuitBreaker::new("contact-service", BreakerSettings::default()));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let permit = breaker.try_acquire();
                    barrier.wait();
                    if let Ok(permit) = permit {
                        permit.record_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        // Outcomes after the transition belong to the old generation.
        assert_eq!(snapshot.buffered_calls, 3);
    }
}
