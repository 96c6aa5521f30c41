//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer ordering)
//!     → security (rate limit, headers)
//!     → auth handlers (public) | auth middleware → contacts.rs (protected)
//!     → health.rs (exempt)
//!     → response.rs (JSON error envelope, fallback rendering)
//!     → Send to client
//! ```

pub mod contacts;
pub mod health;
pub mod response;
pub mod server;

pub use server::{build_router, AppState, HttpServer};
