//! Exponential backoff with jitter between guarded-call attempts.

use rand::Rng;
use std::time::Duration;

use super::retries::RetryPolicy;

/// Delay before the attempt following `attempt` (1-based), without jitter.
///
/// `base_delay_ms * 2^(attempt - 1)`, never above `max_delay_ms`.
pub fn nominal_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let exponent = (attempt - 1).min(63);
    let millis = policy
        .base_delay_ms
        .checked_shl(exponent)
        .filter(|ms| ms >> exponent == policy.base_delay_ms)
        .unwrap_or(u64::MAX)
        .min(policy.max_delay_ms);
    Duration::from_millis(millis)
}

/// [`nominal_delay`] plus up to a tenth of it in random jitter, so callers
/// failing together spread their retries.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let nominal = nominal_delay(policy, attempt);
    let spread = nominal / 10;
    if spread.is_zero() {
        return nominal;
    }
    nominal + rand::thread_rng().gen_range(Duration::ZERO..spread)
}
