use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use common::ChangeKind;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr};
use sea_orm::*;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::{chat, message};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::models::chat::*;
use crate::models::shared::{escape_like, page_window, parse_sort_order};
use crate::services::records::ChatService;
use crate::state::AppState;
use crate::utils::access::find_owned_chat;

#[utoipa::path(
    get,
    path = "/",
    tag = "Chats",
    operation_id = "listChats",
    summary = "List the caller's chats",
    description = "Paginated list of the caller's chats. Filters: exact `title`, exact `model`, \
        case-insensitive `search` on the title. Sorted by `updated_at` (default), `created_at` or `title`, \
        descending unless `sort_order=asc`.",
    params(ChatListQuery),
    responses(
        (status = 200, description = "List of chats", body = ChatListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = %auth_user.user_id))]
pub async fn list_chats(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ChatListQuery>,
) -> Result<Json<ChatListResponse>, AppError> {
    let (page, per_page) = page_window(query.page, query.per_page);

    let sort_column = match query.sort_by.as_deref().unwrap_or("updated_at") {
        "updated_at" => chat::Column::UpdatedAt,
        "created_at" => chat::Column::CreatedAt,
        "title" => chat::Column::Title,
        _ => {
            return Err(AppError::Validation(
                "sort_by must be one of: updated_at, created_at, title".into(),
            ));
        }
    };
    let sort_order = parse_sort_order(query.sort_order.as_deref(), Order::Desc)?;

    let mut select = chat::Entity::find().filter(chat::Column::UserId.eq(auth_user.user_id));

    if let Some(ref title) = query.title {
        select = select.filter(chat::Column::Title.eq(title.as_str()));
    }
    if let Some(ref model) = query.model {
        select = select.filter(chat::Column::Model.eq(model.as_str()));
    }
    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(chat::Column::Title)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let total = select
        .clone()
        .paginate(&state.db, per_page)
        .num_items()
        .await?;

    let data = select
        .order_by(sort_column, sort_order.clone())
        .order_by(chat::Column::Id, sort_order)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(ChatResponse::from)
        .collect();

    Ok(Json(ChatListResponse {
        data,
        pagination: Pagination::new(page, per_page, total),
    }))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Chats",
    operation_id = "createChat",
    summary = "Create a chat",
    description = "Creates a chat owned by the caller. `user_id`, when sent, must be the caller's id.",
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Chat created", body = ChatResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "user_id is not the caller (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn create_chat(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = validate_create_chat(&payload)?;
    if let Some(user_id) = payload.user_id {
        auth_user.require_owner(user_id)?;
    }

    let now = Utc::now();
    let model = chat::ActiveModel {
        id: Set(Uuid::now_v7()),
        title: Set(title),
        model: Set(payload.model),
        user_id: Set(auth_user.user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    ChatService::new(&state, auth_user.user_id).publish_chat(ChangeKind::Created, &model);

    Ok((StatusCode::CREATED, Json(ChatResponse::from(model))))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Chats",
    operation_id = "getChat",
    summary = "Get a chat by ID",
    params(("id" = Uuid, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "Chat", body = ChatResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(chat_id = %id))]
pub async fn get_chat(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatResponse>, AppError> {
    let chat = find_owned_chat(&state.db, auth_user.user_id, id).await?;
    Ok(Json(chat.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Chats",
    operation_id = "updateChat",
    summary = "Update a chat",
    description = "PATCH semantics: only provided fields change; `model: null` clears the model. \
        An empty payload returns the chat unchanged.",
    params(("id" = Uuid, Path, description = "Chat ID")),
    request_body = UpdateChatRequest,
    responses(
        (status = 200, description = "Chat updated", body = ChatResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(chat_id = %id))]
pub async fn update_chat(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    validate_update_chat(&payload)?;

    let existing = find_owned_chat(&state.db, auth_user.user_id, id).await?;
    if payload == UpdateChatRequest::default() {
        return Ok(Json(existing.into()));
    }

    let model = ChatService::new(&state, auth_user.user_id)
        .update_chat(
            &existing,
            payload.title.map(|t| t.trim().to_string()),
            payload.model,
        )
        .await?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Chats",
    operation_id = "deleteChat",
    summary = "Delete a chat",
    description = "Deletes the chat and its messages in one transaction. Generations are kept.",
    params(("id" = Uuid, Path, description = "Chat ID")),
    responses(
        (status = 204, description = "Chat deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the caller's chat (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Chat not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(chat_id = %id))]
pub async fn delete_chat(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_owned_chat(&state.db, auth_user.user_id, id).await?;

    let txn = state.db.begin().await?;
    let removed = message::Entity::delete_many()
        .filter(message::Column::ChatId.eq(id))
        .exec(&txn)
        .await?;
    chat::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    tracing::debug!(messages = removed.rows_affected, "Chat deleted");
    ChatService::new(&state, auth_user.user_id).publish_chat(ChangeKind::Removed, &existing);

    Ok(StatusCode::NO_CONTENT)
}
