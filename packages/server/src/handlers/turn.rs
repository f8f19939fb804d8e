use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use common::TurnEvent;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::chat;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::shared::validate_model_id;
use crate::services::exchange::Exchange;
use crate::services::turn::{TurnInput, run_turn};
use crate::state::AppState;
use crate::utils::access::find_owned_chat;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct TurnRequest {
    #[schema(example = "Can you generate an image of a red fox in snow")]
    pub content: String,
    /// Model for this turn; also becomes the chat's model.
    pub model: Option<String>,
    /// Client correlation id, stored at `metadata.client_ref` of the user message.
    pub client_ref: Option<Uuid>,
}

/// SSE response carrying an exchange's [`TurnEvent`]s, one frame per event.
pub(crate) fn turn_stream(
    rx: UnboundedReceiver<TurnEvent>,
    keepalive: Duration,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream =
        UnboundedReceiverStream::new(rx).map(|ev| Event::default().event(ev.name()).json_data(&ev));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(keepalive).text("keepalive"))
}

/// Start an exchange on `chat`, returning it and the receiving end of its events.
pub(crate) fn open_exchange(
    state: &AppState,
    owner_id: Uuid,
    chat: chat::Model,
) -> (Exchange, UnboundedReceiver<TurnEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Exchange::new(state.clone(), owner_id, chat, tx), rx)
}

#[utoipa::path(
    post,
    path = "/{id}/turns",
    tag = "Chats",
    operation_id = "sendTurn",
    summary = "Send a message and stream the reply",
    description = "Persists the user message, then either generates an image (when the text asks for one) \
        or streams a completion, and finally refreshes a placeholder title. The response is \
        `text/event-stream` of `TurnEvent` frames and always ends with `done`. The turn keeps running \
        if the caller disconnects.",
    params(("id" = Uuid, Path, description = "Chat ID")),
    request_body = TurnRequest,
    responses(
        (status = 200, description = "Turn events", content_type = "text/event-stream", body = common::TurnEvent),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(chat_id = %id, user_id = %auth_user.user_id))]
pub async fn send_turn(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<TurnRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let chat = find_owned_chat(&state.db, auth_user.user_id, id).await?;

    let content = payload.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Content must not be empty".into()));
    }
    let model = payload.model.filter(|m| !m.trim().is_empty());
    if let Some(ref model) = model {
        validate_model_id(model)?;
    }

    let (exchange, rx) = open_exchange(&state, auth_user.user_id, chat);
    let input = TurnInput {
        content: content.to_string(),
        model,
        client_ref: payload.client_ref,
    };
    tokio::spawn(run_turn(exchange, input));

    Ok(turn_stream(rx, state.events.keepalive()))
}
