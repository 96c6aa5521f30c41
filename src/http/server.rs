//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware in pipeline order
//! - Bind the server to a listener and serve until shutdown
//! - Start the idle-bucket sweeper when configured

use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::contacts::{list_contacts, search_contacts, CONTACTS_PATH, SEARCH_PATH};
use super::health::{health, HEALTH_PATH};
use super::response::panic_response;
use crate::auth::{handlers, require_auth, UserDirectory};
use crate::config::GatekeeperConfig;
use crate::downstream::{ContactStore, GuardedContacts};
use crate::gatekeeper::Gatekeeper;
use crate::lifecycle::Shutdown;
use crate::observability::metrics::AuthCounters;
use crate::security::headers::{security_headers_middleware, SecurityHeaders};
use crate::security::rate_limit::{rate_limit_middleware, spawn_idle_sweeper};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gatekeeper: Gatekeeper,
    pub directory: Arc<dyn UserDirectory>,
    pub contacts: GuardedContacts,
    pub counters: Arc<AuthCounters>,
}

impl AppState {
    pub fn new(
        gatekeeper: Gatekeeper,
        directory: Arc<dyn UserDirectory>,
        store: Arc<dyn ContactStore>,
    ) -> Self {
        let contacts = GuardedContacts::new(store, Arc::clone(gatekeeper.breakers()));
        Self {
            gatekeeper,
            directory,
            contacts,
            counters: Arc::new(AuthCounters::new()),
        }
    }
}

/// HTTP server for the gatekeeper.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatekeeperConfig,
}

impl HttpServer {
    pub fn new(config: GatekeeperConfig, state: AppState) -> Self {
        let router = build_router(&config, state.clone());
        Self {
            router,
            state,
            config,
        }
    }

    /// A clone of the fully layered router, for driving without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Run the server on `listener` until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, profile = ?self.config.profile, "HTTP server starting");

        let idle_secs = self.config.rate_limit.idle_eviction_secs;
        let sweeper = (idle_secs > 0).then(|| {
            spawn_idle_sweeper(
                Arc::clone(self.state.gatekeeper.limiter()),
                Duration::from_secs(idle_secs),
                shutdown.subscribe(),
            )
        });

        let mut signal = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.recv().await })
            .await?;

        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router with all middleware layers.
///
/// Outermost first: panic guard, request id, trace, security headers,
/// rate limiter, timeout, body limit, then authentication on protected
/// routes only.
#[allow(deprecated)]
pub fn build_router(config: &GatekeeperConfig, state: AppState) -> Router {
    let headers = Arc::new(SecurityHeaders::new(
        config.security.enable_headers,
        config.rate_limit.exempt_prefixes.clone(),
    ));
    let limiter = Arc::clone(state.gatekeeper.limiter());

    let protected = Router::new()
        .route(CONTACTS_PATH, get(list_contacts))
        .route(SEARCH_PATH, get(search_contacts))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(handlers::router())
        .merge(protected)
        .route(HEALTH_PATH, get(health))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.server.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs)))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(middleware::from_fn_with_state(headers, security_headers_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CatchPanicLayer::custom(panic_response))
}
