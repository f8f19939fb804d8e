use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sea_orm::*;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::auth::{
    LoginRequest, LoginResponse, OAuthRequest, ProviderProfile, RegisterRequest,
    RegisterResponse, normalize_email, validate_login_request, validate_register_request,
};
use crate::models::user::UserResponse;
use crate::state::AppState;
use crate::utils::{hash, jwt};

#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    operation_id = "register",
    summary = "Register a new account",
    description = "Creates a user with an argon2id password hash. Emails are stored trimmed and lowercased.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Email already registered (EMAIL_TAKEN)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_register_request(&payload)?;

    let hash = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;

    let now = Utc::now();
    let new_user = user::ActiveModel {
        id: Set(Uuid::now_v7()),
        email: Set(normalize_email(&payload.email)),
        password: Set(Some(hash)),
        full_name: Set(payload
            .full_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())),
        avatar_url: Set(None),
        google_id: Set(None),
        facebook_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let user = new_user.insert(&state.db).await.map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            tracing::debug!("Registration conflict: email already exists");
            AppError::EmailTaken
        }
        _ => AppError::from(e),
    })?;

    Ok((StatusCode::CREATED, Json(RegisterResponse::from(user))))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in with email and password",
    description = "Returns a bearer token and the user's profile.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Bad credentials (INVALID_CREDENTIALS)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    validate_login_request(&payload)?;

    let user = user::Entity::find()
        .filter(user::Column::Email.eq(normalize_email(&payload.email)))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    // OAuth-only accounts have no password.
    let stored = user
        .password
        .as_deref()
        .ok_or(AppError::InvalidCredentials)?;
    let is_valid = hash::verify_password(&payload.password, stored)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;

    if !is_valid {
        return Err(AppError::InvalidCredentials);
    }

    Ok(Json(issue_token(&state, user)?))
}

#[utoipa::path(
    post,
    path = "/oauth/{provider}",
    tag = "Auth",
    operation_id = "oauthLogin",
    summary = "Sign in with an identity provider",
    description = "Exchanges a provider access token (`google` or `facebook`) for a bearer token. \
        The provider's userinfo endpoint identifies the account, which is linked by provider id, \
        then by email, or created.",
    params(("provider" = String, Path, description = "`google` or `facebook`")),
    request_body = OAuthRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Provider rejected the token (INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 404, description = "Unknown provider (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(provider = %provider))]
pub async fn oauth_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    AppJson(payload): AppJson<OAuthRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let oauth = &state.config.auth.oauth;
    let (userinfo_url, id_column) = match provider.as_str() {
        "google" => (&oauth.google_userinfo_url, user::Column::GoogleId),
        "facebook" => (&oauth.facebook_userinfo_url, user::Column::FacebookId),
        _ => return Err(AppError::NotFound(format!("Unknown provider '{provider}'"))),
    };
    if payload.access_token.trim().is_empty() {
        return Err(AppError::Validation("access_token must not be empty".into()));
    }

    let profile = fetch_profile(userinfo_url, payload.access_token.trim()).await?;

    let existing = match user::Entity::find()
        .filter(id_column.eq(profile.id.as_str()))
        .one(&state.db)
        .await?
    {
        Some(user) => Some(user),
        None => match profile.email.as_deref().map(normalize_email) {
            Some(email) => {
                user::Entity::find()
                    .filter(user::Column::Email.eq(email))
                    .one(&state.db)
                    .await?
            }
            None => None,
        },
    };

    let now = Utc::now();
    let user = match existing {
        Some(user) => {
            let mut active: user::ActiveModel = user.clone().into();
            let provider_id = Set(Some(profile.id.clone()));
            match provider.as_str() {
                "google" => active.google_id = provider_id,
                _ => active.facebook_id = provider_id,
            }
            if user.full_name.is_none() {
                active.full_name = Set(profile.name.clone());
            }
            if user.avatar_url.is_none() {
                active.avatar_url = Set(profile.picture.clone());
            }
            active.updated_at = Set(now);
            active.update(&state.db).await?
        }
        None => {
            let email = profile
                .email
                .as_deref()
                .map(normalize_email)
                .ok_or_else(|| {
                    AppError::Validation("The provider did not share an email address".into())
                })?;
            let (google_id, facebook_id) = match provider.as_str() {
                "google" => (Some(profile.id.clone()), None),
                _ => (None, Some(profile.id.clone())),
            };
            user::ActiveModel {
                id: Set(Uuid::now_v7()),
                email: Set(email),
                password: Set(None),
                full_name: Set(profile.name.clone()),
                avatar_url: Set(profile.picture.clone()),
                google_id: Set(google_id),
                facebook_id: Set(facebook_id),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&state.db)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => AppError::EmailTaken,
                _ => AppError::from(e),
            })?
        }
    };

    Ok(Json(issue_token(&state, user)?))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "me",
    summary = "Current user's profile",
    responses(
        (status = 200, description = "Profile", body = UserResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "User no longer exists (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn me(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, AppError> {
    let user = user::Entity::find_by_id(auth_user.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

fn issue_token(state: &AppState, user: user::Model) -> Result<LoginResponse, AppError> {
    let token = jwt::sign(
        user.id,
        &user.email,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_hours,
    )
    .map_err(|e| AppError::Internal(format!("JWT sign error: {}", e)))?;

    Ok(LoginResponse {
        token,
        user: user.into(),
    })
}

async fn fetch_profile(userinfo_url: &str, access_token: &str) -> Result<ProviderProfile, AppError> {
    let resp = reqwest::Client::new()
        .get(userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "OAuth provider unreachable");
            AppError::InvalidCredentials
        })?;

    if !resp.status().is_success() {
        tracing::warn!(status = resp.status().as_u16(), "OAuth provider rejected token");
        return Err(AppError::InvalidCredentials);
    }

    resp.json::<ProviderProfile>().await.map_err(|e| {
        tracing::warn!(error = %e, "OAuth provider returned an unexpected profile");
        AppError::InvalidCredentials
    })
}
