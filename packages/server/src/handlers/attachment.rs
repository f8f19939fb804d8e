use axum::extract::{Multipart, Path, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use tracing::instrument;
use uuid::Uuid;

use super::turn::{open_exchange, turn_stream};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::shared::validate_model_id;
use crate::models::upload::AttachmentForm;
use crate::services::attachment::{AttachmentInput, run_attachment};
use crate::state::AppState;
use crate::utils::access::find_owned_chat;
use crate::utils::multipart::{FilePart, next_field, read_file, read_text};

#[utoipa::path(
    post,
    path = "/{id}/attachments",
    tag = "Chats",
    operation_id = "attachFile",
    summary = "Attach a file and stream its analysis",
    description = "Stores the file, records it in the chat and streams a vision model's analysis as \
        `TurnEvent` frames. A model without vision support is replaced by the configured vision model \
        (`model_switched`). The size cap is enforced before any stream is opened.",
    params(("id" = Uuid, Path, description = "Chat ID")),
    request_body(content = AttachmentForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Turn events", content_type = "text/event-stream", body = common::TurnEvent),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
        (status = 413, description = "File exceeds the upload cap (PAYLOAD_TOO_LARGE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(chat_id = %id, user_id = %auth_user.user_id))]
pub async fn attach_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let chat = find_owned_chat(&state.db, auth_user.user_id, id).await?;

    let max_bytes = state.config.storage.max_upload_bytes;
    let mut file: Option<FilePart> = None;
    let mut prompt = None;
    let mut model = None;
    let mut client_ref = None;

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => file = Some(read_file(field, max_bytes).await?),
            "prompt" => prompt = read_text(field).await?,
            "model" => model = read_text(field).await?,
            "client_ref" => {
                client_ref = read_text(field)
                    .await?
                    .map(|raw| {
                        raw.parse::<Uuid>()
                            .map_err(|_| AppError::Validation("client_ref must be a UUID".into()))
                    })
                    .transpose()?
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::Validation("file field is required".into()))?;
    if file.data.is_empty() {
        return Err(AppError::Validation("File must not be empty".into()));
    }
    if let Some(ref model) = model {
        validate_model_id(model)?;
    }
    tracing::info!(file_name = %file.file_name, mime = %file.mime, size = file.size(), "Attachment received");

    let (exchange, rx) = open_exchange(&state, auth_user.user_id, chat);
    let input = AttachmentInput {
        file,
        prompt,
        model,
        client_ref,
    };
    tokio::spawn(run_attachment(exchange, input));

    Ok(turn_stream(rx, state.events.keepalive()))
}
