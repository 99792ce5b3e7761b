//! API route modules.

pub mod health;
pub mod logging;
pub mod poll;
pub mod streamers;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/streamers", streamers::router())
        .nest("/api/poll", poll::router())
        .nest("/api/logging", logging::router())
        .nest("/health", health::router())
        .with_state(state)
}
