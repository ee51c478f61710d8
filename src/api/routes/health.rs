//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (ready to serve traffic)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Kubernetes readiness probe.
/// Returns 200 once the database answers a trivial query.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.store.ping() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with component details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let storage_ok = state.store.ping();

    Json(HealthResponse {
        status: if storage_ok { "healthy" } else { "unhealthy" }.to_string(),
        storage: if storage_ok { "ok" } else { "error" }.to_string(),
        realtime_connections: state.ws_connection_count().await,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_full_health_reports_storage() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let state = Arc::new(AppState::new(store, Config::default()));

        let Json(health) = full_health(State(state)).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.storage, "ok");
        assert_eq!(health.realtime_connections, 0);
    }
}
