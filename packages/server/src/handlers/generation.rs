use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::ChangeKind;
use common::storage::ObjectKey;
use sea_orm::*;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::generation;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::models::generation::*;
use crate::models::shared::page_window;
use crate::services::records::{ChatService, NewGeneration};
use crate::state::AppState;
use crate::utils::access::{find_owned_chat, find_owned_generation};

const DEFAULT_MODEL: &str = "upload";

async fn list_page(
    state: &AppState,
    user_id: Uuid,
    chat_id: Option<Uuid>,
    query: GenerationListQuery,
) -> Result<GenerationListResponse, AppError> {
    let (page, per_page) = page_window(query.page, query.per_page);

    let mut select = generation::Entity::find().filter(generation::Column::UserId.eq(user_id));
    if let Some(chat_id) = chat_id.or(query.chat_id) {
        select = select.filter(generation::Column::ChatId.eq(chat_id));
    }
    if let Some(ref status) = query.status {
        select = select.filter(generation::Column::Status.eq(status.as_str()));
    }
    if let Some(ref model) = query.model {
        select = select.filter(generation::Column::Model.eq(model.as_str()));
    }

    let total = select
        .clone()
        .paginate(&state.db, per_page)
        .num_items()
        .await?;

    let data = select
        .order_by_desc(generation::Column::CreatedAt)
        .order_by_desc(generation::Column::Id)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(GenerationResponse::from)
        .collect();

    Ok(GenerationListResponse {
        data,
        pagination: Pagination::new(page, per_page, total),
    })
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Generations",
    operation_id = "listGenerations",
    summary = "List the caller's generations",
    description = "The caller's gallery, newest first. Optional `chat_id`, `status` and `model` filters.",
    params(GenerationListQuery),
    responses(
        (status = 200, description = "List of generations", body = GenerationListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = %auth_user.user_id))]
pub async fn list_generations(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<GenerationListQuery>,
) -> Result<Json<GenerationListResponse>, AppError> {
    Ok(Json(
        list_page(&state, auth_user.user_id, None, query).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/{id}/generations",
    tag = "Generations",
    operation_id = "listChatGenerations",
    summary = "List a chat's generations",
    params(("id" = Uuid, Path, description = "Chat ID"), GenerationListQuery),
    responses(
        (status = 200, description = "List of generations", body = GenerationListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(chat_id = %id))]
pub async fn list_chat_generations(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppQuery(query): AppQuery<GenerationListQuery>,
) -> Result<Json<GenerationListResponse>, AppError> {
    find_owned_chat(&state.db, auth_user.user_id, id).await?;
    Ok(Json(
        list_page(&state, auth_user.user_id, Some(id), query).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Generations",
    operation_id = "createGeneration",
    summary = "Record a generation",
    description = "Records an artifact the client produced elsewhere. Defaults: model `upload`, \
        1024x768, status `completed`, metadata `{}`.",
    request_body = CreateGenerationRequest,
    responses(
        (status = 201, description = "Generation created", body = GenerationResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(chat_id = %payload.chat_id))]
pub async fn create_generation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateGenerationRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_create_generation(&payload)?;
    find_owned_chat(&state.db, auth_user.user_id, payload.chat_id).await?;

    let mut new = NewGeneration::completed(
        payload.chat_id,
        payload.prompt.trim().to_string(),
        payload.url,
        payload.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
    );
    new.width = payload.width.unwrap_or(DEFAULT_WIDTH);
    new.height = payload.height.unwrap_or(DEFAULT_HEIGHT);
    if let Some(status) = payload.status {
        new.status = status;
    }
    if let Some(metadata) = payload.metadata {
        new.metadata = metadata;
    }

    let model = ChatService::new(&state, auth_user.user_id)
        .insert_generation(new)
        .await?;

    Ok((StatusCode::CREATED, Json(GenerationResponse::from(model))))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Generations",
    operation_id = "getGeneration",
    summary = "Get a generation by ID",
    params(("id" = Uuid, Path, description = "Generation ID")),
    responses(
        (status = 200, description = "Generation", body = GenerationResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's generation (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Generation not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(generation_id = %id))]
pub async fn get_generation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationResponse>, AppError> {
    let generation = find_owned_generation(&state.db, auth_user.user_id, id).await?;
    Ok(Json(generation.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Generations",
    operation_id = "updateGeneration",
    summary = "Update a generation",
    description = "Only `status` and `metadata` are mutable.",
    params(("id" = Uuid, Path, description = "Generation ID")),
    request_body = UpdateGenerationRequest,
    responses(
        (status = 200, description = "Generation updated", body = GenerationResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's generation (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Generation not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(generation_id = %id))]
pub async fn update_generation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateGenerationRequest>,
) -> Result<Json<GenerationResponse>, AppError> {
    validate_update_generation(&payload)?;

    let existing = find_owned_generation(&state.db, auth_user.user_id, id).await?;
    if payload == UpdateGenerationRequest::default() {
        return Ok(Json(existing.into()));
    }

    let mut active: generation::ActiveModel = existing.into();
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    if let Some(metadata) = payload.metadata {
        active.metadata = Set(metadata);
    }
    let model = active.update(&state.db).await?;

    ChatService::new(&state, auth_user.user_id).publish_generation(ChangeKind::Patched, &model);

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Generations",
    operation_id = "deleteGeneration",
    summary = "Delete a generation",
    description = "Deletes the row and, when `metadata.storage_key` is set, the stored object. \
        A failed object delete is logged and does not fail the request.",
    params(("id" = Uuid, Path, description = "Generation ID")),
    responses(
        (status = 204, description = "Generation deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's generation (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Generation not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(generation_id = %id))]
pub async fn delete_generation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_owned_generation(&state.db, auth_user.user_id, id).await?;
    generation::Entity::delete_by_id(id).exec(&state.db).await?;

    if let Some(raw) = existing.metadata.get("storage_key").and_then(|v| v.as_str()) {
        match ObjectKey::parse(raw) {
            Ok(key) => match state.objects.exists(&key).await {
                Ok(true) => {
                    if let Err(e) = state.objects.delete(&key).await {
                        tracing::warn!(key = raw, error = %e, "Failed to delete stored object");
                    }
                }
                Ok(false) => tracing::debug!(key = raw, "Stored object already gone"),
                Err(e) => tracing::warn!(key = raw, error = %e, "Failed to look up stored object"),
            },
            Err(e) => tracing::warn!(key = raw, error = %e, "Ignoring malformed storage key"),
        }
    }

    ChatService::new(&state, auth_user.user_id)
        .publish_generation(ChangeKind::Removed, &existing);

    Ok(StatusCode::NO_CONTENT)
}
