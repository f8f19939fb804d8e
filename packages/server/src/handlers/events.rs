use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use common::Resource;
use futures::Stream;
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppQuery;
use crate::state::AppState;

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Comma-separated resource names (users, chats, message, generations).
    /// Defaults to all four.
    #[param(example = "chats,message")]
    pub resources: Option<String>,
}

fn parse_resources(raw: Option<&str>) -> Result<Vec<Resource>, AppError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(Resource::ALL.to_vec());
    };
    let mut resources = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let resource = name.parse::<Resource>().map_err(AppError::Validation)?;
        if !resources.contains(&resource) {
            resources.push(resource);
        }
    }
    Ok(resources)
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Events",
    operation_id = "streamEvents",
    summary = "Subscribe to change events",
    description = "Server-sent events for create/patch/remove of the caller's records. Each frame is \
        `event: <resource>` with a `ChangeEvent` JSON body. Slow listeners lose the oldest events.",
    params(EventsQuery),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = common::ChangeEvent),
        (status = 400, description = "Unknown resource (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = %auth_user.user_id))]
pub async fn stream_events(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let resources = parse_resources(query.resources.as_deref())?;
    let response = state.events.sse_response(auth_user.user_id, resources);
    tracing::debug!(listeners = state.events.listener_count(), "Event listener attached");
    Ok(response)
}
