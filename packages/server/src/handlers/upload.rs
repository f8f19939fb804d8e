use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::content::is_image_mime;
use common::storage::ObjectOrigin;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::shared::validate_model_id;
use crate::models::upload::{UploadForm, UploadResponse};
use crate::services::records::{ChatService, NewGeneration};
use crate::services::storage;
use crate::state::AppState;
use crate::utils::access::find_owned_chat;
use crate::utils::multipart::{FilePart, next_field, read_file, read_text};

const UPLOAD_MODEL: &str = "upload";

#[derive(Default)]
struct UploadFields {
    file: Option<FilePart>,
    file_type: Option<String>,
    is_generated: bool,
    prompt: Option<String>,
    chat_id: Option<Uuid>,
    model: Option<String>,
}

async fn read_upload_form(
    mut multipart: Multipart,
    max_bytes: u64,
) -> Result<UploadFields, AppError> {
    let mut fields = UploadFields::default();
    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => fields.file = Some(read_file(field, max_bytes).await?),
            "file_type" => fields.file_type = read_text(field).await?,
            "is_generated" => {
                fields.is_generated = match read_text(field).await?.as_deref() {
                    None | Some("false") => false,
                    Some("true") => true,
                    Some(other) => {
                        return Err(AppError::Validation(format!(
                            "is_generated must be true or false, got '{other}'"
                        )));
                    }
                }
            }
            "prompt" => fields.prompt = read_text(field).await?,
            "chat_id" => {
                fields.chat_id = read_text(field)
                    .await?
                    .map(|raw| {
                        raw.parse::<Uuid>()
                            .map_err(|_| AppError::Validation("chat_id must be a UUID".into()))
                    })
                    .transpose()?
            }
            "model" => fields.model = read_text(field).await?,
            _ => {}
        }
    }
    Ok(fields)
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Uploads",
    operation_id = "uploadFile",
    summary = "Store a file",
    description = "Stores the file under `uploaded/` (or `generated/` when `is_generated=true`) and returns \
        its public URL. An image sent with an owned `chat_id` also gets a generation record.",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "chat_id is not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "chat_id not found (NOT_FOUND)", body = ErrorBody),
        (status = 413, description = "File exceeds the upload cap (PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 502, description = "Object store failure (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = %auth_user.user_id))]
pub async fn upload_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let fields = read_upload_form(multipart, state.config.storage.max_upload_bytes).await?;
    let file = fields
        .file
        .ok_or_else(|| AppError::Validation("file field is required".into()))?;
    if file.data.is_empty() {
        return Err(AppError::Validation("File must not be empty".into()));
    }
    if let Some(ref model) = fields.model {
        validate_model_id(model)?;
    }

    let chat = match fields.chat_id {
        Some(chat_id) => Some(find_owned_chat(&state.db, auth_user.user_id, chat_id).await?),
        None => None,
    };

    let mime = fields.file_type.unwrap_or_else(|| file.mime.clone());
    let origin = if fields.is_generated {
        ObjectOrigin::Generated
    } else {
        ObjectOrigin::Uploaded
    };

    let stored = storage::store(state.objects.as_ref(), origin, &file.data, &mime).await?;
    let content_hash = stored.content_hash.to_hex();
    tracing::info!(key = %stored.key, size = stored.size, "File stored");

    let mut generation_id = None;
    if let Some(chat) = chat
        && is_image_mime(&mime)
    {
        let mut new = NewGeneration::completed(
            chat.id,
            fields.prompt.unwrap_or_else(|| file.file_name.clone()),
            stored.url.clone(),
            fields.model.unwrap_or_else(|| UPLOAD_MODEL.into()),
        );
        new.metadata = json!({
            "file_type": mime,
            "file_name": file.file_name,
            "is_generated": fields.is_generated,
            "storage_key": stored.key,
            "content_hash": content_hash,
        });
        let generation = ChatService::new(&state, auth_user.user_id)
            .insert_generation(new)
            .await?;
        generation_id = Some(generation.id);
    }

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            url: stored.url,
            key: stored.key,
            content_hash,
            size: stored.size,
            generation_id,
        }),
    ))
}
