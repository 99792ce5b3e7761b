//! On-demand poll cycle.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::server::AppState;
use crate::scheduler::CycleOutcome;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(poll_now))
}

/// Run a cycle now. Returns `skipped` if one is already running.
async fn poll_now(State(state): State<AppState>) -> Json<CycleOutcome> {
    Json(state.scheduler.tick().await)
}
