//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! /api/auth/* (public):
//!     → handlers.rs (login / register / refresh)
//!     → directory.rs (credential check, account creation)
//!     → token.rs (issue access + refresh pair)
//!
//! Protected routes:
//!     → middleware.rs (Bearer token → token.rs validate as Access)
//!     → directory.rs (subject still exists)
//!     → AuthenticatedUser request extension
//! ```
//!
//! # Design Decisions
//! - Tokens are stateless; invalidation is by expiry or secret rotation only
//! - Auth failures are recoverable and map to fixed client messages
//! - Refresh accepts only refresh tokens; protected routes only access tokens

pub mod directory;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod token;

pub use directory::{DirectoryError, InMemoryDirectory, UserDirectory};
pub use error::AuthError;
pub use middleware::{require_auth, AuthenticatedUser};
pub use token::{Claims, IssuedToken, TokenError, TokenKind, TokenService};
