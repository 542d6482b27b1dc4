//! Running monitor loops.

use axum::{Json, Router, extract::{Path, State}, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::monitor::MonitorMetricsSnapshot;

/// Create the monitors router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_monitors))
        .route("/{*stream_url}", get(get_monitor))
}

/// One running loop with its counters.
#[derive(Debug, Serialize)]
pub struct MonitorEntry {
    pub stream_url: String,
    pub started_at: DateTime<Utc>,
    /// Absent until the loop registers its metrics.
    pub metrics: Option<MonitorMetricsSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct MonitorListResponse {
    pub total: usize,
    pub degraded: usize,
    pub monitors: Vec<MonitorEntry>,
}

fn entry(state: &AppState, stream_url: String, started_at: DateTime<Utc>) -> MonitorEntry {
    let metrics = state.metrics.get(&stream_url).map(|m| m.snapshot());
    MonitorEntry {
        stream_url,
        started_at,
        metrics,
    }
}

async fn list_monitors(State(state): State<AppState>) -> Json<MonitorListResponse> {
    let monitors: Vec<MonitorEntry> = state
        .running
        .entries()
        .into_iter()
        .map(|(url, started_at)| entry(&state, url, started_at))
        .collect();
    let degraded = monitors
        .iter()
        .filter(|m| m.metrics.as_ref().is_some_and(|s| s.last_cycle_failures > 0))
        .count();

    Json(MonitorListResponse {
        total: monitors.len(),
        degraded,
        monitors,
    })
}

/// Look up one loop; the URL is passed as the remaining path.
async fn get_monitor(
    State(state): State<AppState>,
    Path(stream_url): Path<String>,
) -> ApiResult<Json<MonitorEntry>> {
    state
        .running
        .entries()
        .into_iter()
        .find(|(url, _)| *url == stream_url)
        .map(|(url, started_at)| Json(entry(&state, url, started_at)))
        .ok_or_else(|| ApiError::not_found(format!("No monitor running for '{}'", stream_url)))
}
