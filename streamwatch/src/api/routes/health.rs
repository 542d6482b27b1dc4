//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::server::AppState;
use crate::metrics::{HealthChecker, SystemHealth};

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

async fn system_health(state: &AppState) -> SystemHealth {
    match &state.health_checker {
        Some(checker) => checker.check_all().await,
        // No database wired in: report on the monitor loops only.
        None => {
            HealthChecker::without_database(state.metrics.clone(), state.running.clone())
                .check_all()
                .await
        }
    }
}

/// Full health report. Unhealthy maps to HTTP 503.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = system_health(&state).await;
    let status = if health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// Readiness check: 200 when healthy or degraded, 503 otherwise.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if system_health(&state).await.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": uptime
        })),
    )
}
