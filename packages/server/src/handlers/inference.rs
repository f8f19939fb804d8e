use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::instrument;

use crate::config::ModelInfo;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::inference::GeneratedImage;
use crate::models::inference::*;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/models",
    tag = "Inference",
    operation_id = "listModels",
    summary = "List available models",
    description = "The configured model catalog. Entries with `vision: true` accept file attachments.",
    responses(
        (status = 200, description = "Model catalog", body = Vec<ModelInfo>),
    ),
)]
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    Json(state.inference.models().to_vec())
}

fn delta_event(text: &str) -> Event {
    Event::default()
        .event("delta")
        .json_data(DeltaFrame { text: text.into() })
        .unwrap_or_else(|_| Event::default().event("delta").data(text))
}

#[utoipa::path(
    post,
    path = "/completions",
    tag = "Inference",
    operation_id = "createCompletion",
    summary = "Relay a chat completion",
    description = "Forwards the messages to the completion endpoint. With `stream=true` the response is \
        `text/event-stream`: `delta` frames carrying `{text}`, then `done`, or `error` with `{message}`.",
    request_body = CompletionRequest,
    responses(
        (status = 200, description = "Completion (JSON, or an event stream when `stream=true`)", body = CompletionResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 502, description = "Upstream failure (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id, stream = payload.stream))]
pub async fn create_completion(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CompletionRequest>,
) -> Result<Response, AppError> {
    validate_completion(&payload)?;
    let model = payload
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.inference.default_model.clone());

    if !payload.stream {
        let content = state
            .inference
            .complete(&model, &payload.messages, None)
            .await?;
        return Ok(Json(CompletionResponse { content, model }).into_response());
    }

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let inference = state.inference.clone();
    let messages = payload.messages;
    tokio::spawn(async move {
        let deltas = tx.clone();
        let result = inference
            .chat_stream(&model, &messages, move |text| {
                let _ = deltas.send(delta_event(text));
            })
            .await;
        let last = match result {
            Ok(_) => Event::default().event("done").data("{}"),
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "Streamed completion failed");
                Event::default()
                    .event("error")
                    .json_data(serde_json::json!({ "message": e.to_string() }))
                    .unwrap_or_else(|_| Event::default().event("error"))
            }
        };
        let _ = tx.send(last);
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    let keepalive = state.events.keepalive();
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(keepalive).text("keepalive"))
        .into_response())
}

#[utoipa::path(
    post,
    path = "/images",
    tag = "Inference",
    operation_id = "generateImage",
    summary = "Generate an image",
    description = "Calls the image-generation endpoint with the configured model and size and returns \
        the base64 payload. Nothing is stored.",
    request_body = ImageRequest,
    responses(
        (status = 200, description = "Generated image", body = GeneratedImage),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 502, description = "Upstream failure (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn generate_image(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ImageRequest>,
) -> Result<Json<GeneratedImage>, AppError> {
    validate_image_request(&payload)?;
    let image = state.inference.generate_image(payload.prompt.trim()).await?;
    Ok(Json(image))
}
