//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::models::HealthResponse;
use crate::api::server::AppState;
use crate::scheduler::CycleOutcome;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let last_cycle = state.scheduler.last_cycle();
    let last_aborted = last_cycle
        .as_ref()
        .is_some_and(|c| matches!(c.outcome, CycleOutcome::Aborted { .. }));
    let status = if last_aborted || !state.scheduler.handshake_succeeded() {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        watched: state.commands.watch_list().len(),
        live: state.tracker.live_count(),
        cycles_run: state.scheduler.cycles_run(),
        last_cycle,
    })
}

/// Liveness check - is the process responsive?
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
