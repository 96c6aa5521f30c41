//! The gatekeeper pipeline: rate limiter, token service and breaker
//! registry, owned together and handed to the HTTP layer.
//!
//! # Data Flow
//! ```text
//! request → RateLimiter (admit/reject)
//!         → TokenService (authenticate on protected routes)
//!         → handler → CircuitBreakerRegistry (guarded downstream calls)
//! ```
//!
//! The three parts share no locks; they are composed only by the order in
//! which the server layers them.

use std::sync::Arc;

use crate::auth::TokenService;
use crate::config::GatekeeperConfig;
use crate::resilience::{CircuitBreakerRegistry, RetryPolicy};
use crate::security::RateLimiter;

#[derive(Debug, Clone)]
pub struct Gatekeeper {
    limiter: Arc<RateLimiter>,
    tokens: Arc<TokenService>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl Gatekeeper {
    pub fn new(
        limiter: Arc<RateLimiter>,
        tokens: Arc<TokenService>,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            limiter,
            tokens,
            breakers,
        }
    }

    /// Build every part from configuration. `secret` must already have been
    /// resolved against the deployment profile.
    pub fn from_config(config: &GatekeeperConfig, secret: &str) -> Self {
        Self::new(
            Arc::new(RateLimiter::new(&config.rate_limit)),
            Arc::new(TokenService::from_config(&config.auth, secret)),
            Arc::new(CircuitBreakerRegistry::from_config(
                &config.circuit_breaker,
                RetryPolicy::from_config(&config.retries),
            )),
        )
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_isolated() {
        let config = GatekeeperConfig::default();
        let secret = "0123456789abcdef0123456789abcdef";
        let first = Gatekeeper::from_config(&config, secret);
        let second = Gatekeeper::from_config(&config, secret);

        for _ in 0..5 {
            assert!(first.limiter().admit("c", "/api/auth/login"));
        }
        assert!(!first.limiter().admit("c", "/api/auth/login"));
        assert!(second.limiter().admit("c", "/api/auth/login"));
    }

    #[test]
    fn test_tokens_share_the_secret() {
        let config = GatekeeperConfig::default();
        let gatekeeper = Gatekeeper::from_config(&config, "0123456789abcdef0123456789abcdef");
        let issued = gatekeeper.tokens().issue_access_token("alice").unwrap();
        assert_eq!(gatekeeper.tokens().extract_identity(&issued.token).unwrap(), "alice");
    }
}
