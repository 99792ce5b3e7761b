//! Watch list routes: the HTTP form of the add/remove/list commands.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    AddStreamerRequest, AddStreamerResponse, RemoveStreamerResponse, StreamerEntry,
    StreamerListResponse,
};
use crate::api::server::AppState;
use crate::commands::{AddReply, list_message};
use crate::watchlist::RemoveOutcome;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_streamers).post(add_streamer))
        .route("/{login}", delete(remove_streamer))
}

async fn list_streamers(State(state): State<AppState>) -> Json<StreamerListResponse> {
    let ids = state.commands.watch_list();
    let presence = state.tracker.snapshot();

    let streamers = ids
        .iter()
        .map(|id| {
            let current = presence.get(id);
            StreamerEntry {
                login: id.to_string(),
                is_live: current.is_some_and(|s| s.is_live),
                message_id: current
                    .and_then(|s| s.notification.as_ref())
                    .map(|h| h.to_string()),
            }
        })
        .collect();

    Json(StreamerListResponse {
        streamers,
        message: list_message(&ids),
    })
}

async fn add_streamer(
    State(state): State<AppState>,
    Json(request): Json<AddStreamerRequest>,
) -> ApiResult<(StatusCode, Json<AddStreamerResponse>)> {
    let reply = state.commands.watch_add(&request.login).await?;
    let message = reply.message();

    match reply {
        AddReply::Added(identity) => Ok((
            StatusCode::CREATED,
            Json(AddStreamerResponse {
                login: identity.id.to_string(),
                user_id: identity.user_id,
                display_name: identity.display_name,
                message,
            }),
        )),
        AddReply::AlreadyPresent(_) => Err(ApiError::conflict(message)),
    }
}

async fn remove_streamer(
    State(state): State<AppState>,
    Path(login): Path<String>,
) -> ApiResult<Json<RemoveStreamerResponse>> {
    let reply = state.commands.watch_remove(&login).await?;
    let message = reply.message();

    match reply.outcome {
        RemoveOutcome::Removed => Ok(Json(RemoveStreamerResponse {
            login: reply.id.to_string(),
            message,
        })),
        RemoveOutcome::NotFound => Err(ApiError::not_found(message)),
    }
}
