//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, then CLI/env overrides)
//!     → validation.rs (semantic checks on the merged result, signing-secret policy)
//!     → GatekeeperConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, ConfigError, ConfigOverrides};
pub use schema::{
    AuthConfig, BucketPolicyConfig, CircuitBreakerConfig, GatekeeperConfig, LogFormat,
    ObservabilityConfig, Profile, RateLimitConfig, RetryConfig, SecurityConfig, ServerConfig,
};
