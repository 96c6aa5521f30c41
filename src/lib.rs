//! Gatekeeper: rate limiting, token authentication and circuit breaking
//! in front of a contacts service.

pub mod auth;
pub mod config;
pub mod downstream;
pub mod gatekeeper;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::GatekeeperConfig;
pub use gatekeeper::Gatekeeper;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
