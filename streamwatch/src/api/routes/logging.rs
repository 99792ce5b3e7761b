//! Runtime log filter routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::LogFilterBody;
use crate::api::server::AppState;
use crate::logging::LoggingConfig;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

fn logging_config(state: &AppState) -> ApiResult<&LoggingConfig> {
    state
        .logging_config
        .as_deref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))
}

async fn get_logging_config(State(state): State<AppState>) -> ApiResult<Json<LogFilterBody>> {
    let config = logging_config(&state)?;
    Ok(Json(LogFilterBody {
        filter: config.get_filter(),
    }))
}

async fn update_logging_config(
    State(state): State<AppState>,
    Json(body): Json<LogFilterBody>,
) -> ApiResult<Json<LogFilterBody>> {
    let config = logging_config(&state)?;
    config.set_filter(&body.filter)?;
    Ok(Json(LogFilterBody {
        filter: config.get_filter(),
    }))
}
