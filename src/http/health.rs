//! Health endpoint.

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;

use super::server::AppState;
use crate::resilience::BreakerSnapshot;

pub const HEALTH_PATH: &str = "/actuator/health";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub circuit_breakers: BTreeMap<String, BreakerSnapshot>,
    pub rate_limit_buckets: usize,
}

/// Liveness plus breaker and limiter state. Exempt from rate limiting.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "UP",
        circuit_breakers: state.gatekeeper.breakers().snapshot(),
        rate_limit_buckets: state.gatekeeper.limiter().tracked_keys(),
    })
}
