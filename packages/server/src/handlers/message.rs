use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::ChangeKind;
use sea_orm::*;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::message;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::models::message::*;
use crate::models::shared::parse_sort_order;
use crate::services::records::{self, ChatService};
use crate::state::AppState;
use crate::utils::access::{find_owned_chat, find_owned_message};

const DEFAULT_LIMIT: u64 = 100;
const MAX_LIMIT: u64 = 500;

#[utoipa::path(
    get,
    path = "/{id}/messages",
    tag = "Messages",
    operation_id = "listMessages",
    summary = "List a chat's messages",
    description = "Messages of an owned chat, oldest first unless `sort_order=desc`. \
        Optional `role` and `content_type` filters; `limit` 1-500 (default 100).",
    params(("id" = Uuid, Path, description = "Chat ID"), MessageListQuery),
    responses(
        (status = 200, description = "Messages", body = Vec<MessageResponse>),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(chat_id = %id))]
pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppQuery(query): AppQuery<MessageListQuery>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    let sort_order = parse_sort_order(query.sort_order.as_deref(), Order::Asc)?;

    find_owned_chat(&state.db, auth_user.user_id, id).await?;

    let mut select = message::Entity::find().filter(message::Column::ChatId.eq(id));
    if let Some(ref role) = query.role {
        validate_role(role)?;
        select = select.filter(message::Column::Role.eq(role.as_str()));
    }
    if let Some(ref content_type) = query.content_type {
        let kind = parse_content_kind(content_type)?;
        select = select.filter(message::Column::ContentType.eq(kind.as_str()));
    }

    let messages = select
        .order_by(message::Column::CreatedAt, sort_order.clone())
        .order_by(message::Column::Id, sort_order)
        .limit(Some(limit))
        .all(&state.db)
        .await?
        .into_iter()
        .map(MessageResponse::from)
        .collect();

    Ok(Json(messages))
}

#[utoipa::path(
    post,
    path = "/{id}/messages",
    tag = "Messages",
    operation_id = "createMessage",
    summary = "Append a message to a chat",
    description = "Stores a message verbatim without contacting a model. Bumps the chat's `updated_at`. \
        `client_ref`, when sent, is echoed back at `metadata.client_ref`.",
    params(("id" = Uuid, Path, description = "Chat ID")),
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message created", body = MessageResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(chat_id = %id))]
pub async fn create_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<CreateMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new = validate_create_message(payload)?;
    let chat = find_owned_chat(&state.db, auth_user.user_id, id).await?;

    let role = if new.role == ROLE_ASSISTANT {
        ROLE_ASSISTANT
    } else {
        ROLE_USER
    };
    let (message, _) = ChatService::new(&state, auth_user.user_id)
        .insert_message(
            &chat,
            records::NewMessage {
                role,
                content: new.content,
                kind: new.content_type,
                metadata: new.metadata,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(MessageResponse::from(message))))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Messages",
    operation_id = "getMessage",
    summary = "Get a message by ID",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Message", body = MessageResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Message belongs to another user's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(message_id = %id))]
pub async fn get_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let (message, _) = find_owned_message(&state.db, auth_user.user_id, id).await?;
    Ok(Json(message.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Messages",
    operation_id = "updateMessage",
    summary = "Update a message",
    description = "Replaces `content` and/or the whole `metadata` object.",
    params(("id" = Uuid, Path, description = "Message ID")),
    request_body = UpdateMessageRequest,
    responses(
        (status = 200, description = "Message updated", body = MessageResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Message belongs to another user's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(message_id = %id))]
pub async fn update_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateMessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_update_message(&payload)?;

    let (existing, _) = find_owned_message(&state.db, auth_user.user_id, id).await?;
    if payload == UpdateMessageRequest::default() {
        return Ok(Json(existing.into()));
    }

    let mut active: message::ActiveModel = existing.into();
    if let Some(content) = payload.content {
        active.content = Set(content);
    }
    if let Some(metadata) = payload.metadata {
        active.metadata = Set(metadata);
    }
    let model = active.update(&state.db).await?;

    ChatService::new(&state, auth_user.user_id).publish_message(ChangeKind::Patched, &model);

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Messages",
    operation_id = "deleteMessage",
    summary = "Delete a message",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Message belongs to another user's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(message_id = %id))]
pub async fn delete_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (existing, _) = find_owned_message(&state.db, auth_user.user_id, id).await?;
    message::Entity::delete_by_id(id).exec(&state.db).await?;

    ChatService::new(&state, auth_user.user_id).publish_message(ChangeKind::Removed, &existing);

    Ok(StatusCode::NO_CONTENT)
}
