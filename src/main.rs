//! Gatekeeper server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ request id / trace ─▶ rate limiter ──429──▶
//!                                               │
//!                                               ▼
//!                          /api/auth/* ─▶ login / register / refresh ─▶ token service
//!                                               │
//!                          protected  ─▶ bearer auth ─▶ handler ─▶ circuit breaker ─▶ contact store
//!                                                                        │
//!     Client Response  ◀── security headers ◀────────────────────────────┘ (or 503 fallback)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use gatekeeper::auth::InMemoryDirectory;
use gatekeeper::config::validation::resolve_signing_secret;
use gatekeeper::config::{resolve_config, ConfigOverrides, Profile};
use gatekeeper::downstream::InMemoryContactStore;
use gatekeeper::lifecycle::signals::spawn_signal_handler;
use gatekeeper::observability::logging::init_logging;
use gatekeeper::{AppState, Gatekeeper, HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version, about = "Rate limiting, token auth and circuit breaking for the contacts API")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Deployment profile (dev | prod).
    #[arg(long, env = "GATEKEEPER_PROFILE")]
    profile: Option<Profile>,

    /// Override the bind address.
    #[arg(long, env = "GATEKEEPER_BIND")]
    bind: Option<String>,

    /// Token signing secret.
    #[arg(long, env = "GATEKEEPER_SECRET", hide_env_values = true)]
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        profile: args.profile,
        bind_address: args.bind,
        secret: args.secret,
    };
    let config = resolve_config(args.config.as_deref(), overrides)?;

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatekeeper starting");

    let secret = resolve_signing_secret(&config.auth.secret, config.profile)?;

    tracing::info!(
        profile = ?config.profile,
        bind_address = %config.server.bind_address,
        strict_capacity = config.rate_limit.strict.capacity,
        lenient_capacity = config.rate_limit.lenient.capacity,
        breaker_window = config.circuit_breaker.sliding_window_size,
        "Configuration loaded"
    );

    let gatekeeper = Gatekeeper::from_config(&config, &secret);
    let state = AppState::new(
        gatekeeper,
        Arc::new(InMemoryDirectory::new()),
        Arc::new(InMemoryContactStore::new()),
    );

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    HttpServer::new(config, state).run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
