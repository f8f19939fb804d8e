use axum::{Json, extract::State};
use chrono::Utc;
use common::{ChangeKind, Resource};
use sea_orm::*;
use tracing::instrument;

use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::auth::{validate_full_name, validate_password};
use crate::models::user::{UpdateProfileRequest, UserResponse};
use crate::state::AppState;
use crate::utils::hash;

#[utoipa::path(
    patch,
    path = "/me",
    tag = "Users",
    operation_id = "updateProfile",
    summary = "Update the caller's profile",
    description = "PATCH semantics. Email is immutable; a new password is re-hashed. \
        `avatar_url: null` clears the avatar. An empty payload returns the current profile.",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "User no longer exists (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn update_profile(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if let Some(ref name) = payload.full_name {
        validate_full_name(name)?;
    }
    if let Some(ref password) = payload.password {
        validate_password(password)?;
    }

    let existing = user::Entity::find_by_id(auth_user.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if payload == UpdateProfileRequest::default() {
        return Ok(Json(existing.into()));
    }

    let mut active: user::ActiveModel = existing.into();
    if let Some(name) = payload.full_name {
        let name = name.trim().to_string();
        active.full_name = Set((!name.is_empty()).then_some(name));
    }
    if let Some(avatar_url) = payload.avatar_url {
        active.avatar_url = Set(avatar_url);
    }
    if let Some(password) = payload.password {
        let hash = hash::hash_password(&password)
            .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;
        active.password = Set(Some(hash));
    }
    active.updated_at = Set(Utc::now());

    let model = active.update(&state.db).await?;
    let response = UserResponse::from(model);
    state.events.emit(
        Resource::Users,
        ChangeKind::Patched,
        auth_user.user_id,
        None,
        &response,
    );

    Ok(Json(response))
}
