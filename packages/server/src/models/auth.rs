use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserResponse;
use crate::error::AppError;

/// Request body for user registration.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    /// Email address (3-254 characters, stored lowercased).
    #[schema(example = "alice@example.com")]
    pub email: String,
    /// Password (8-128 characters).
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
    /// Optional display name.
    #[schema(example = "Alice Liddell")]
    pub full_name: Option<String>,
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    let len = email.chars().count();
    if !(3..=254).contains(&len) || !email.contains('@') {
        return Err(AppError::Validation(
            "Email must be 3-254 characters and contain '@'".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 || password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be 8-128 characters".into(),
        ));
    }
    Ok(())
}

pub fn validate_full_name(name: &str) -> Result<(), AppError> {
    if name.trim().chars().count() > 128 {
        return Err(AppError::Validation(
            "Full name must be at most 128 characters".into(),
        ));
    }
    Ok(())
}

pub fn validate_register_request(payload: &RegisterRequest) -> Result<(), AppError> {
    validate_email(&normalize_email(&payload.email))?;
    validate_password(&payload.password)?;
    if let Some(ref name) = payload.full_name {
        validate_full_name(name)?;
    }
    Ok(())
}

/// Request body for user login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

pub fn validate_login_request(payload: &LoginRequest) -> Result<(), AppError> {
    if payload.email.trim().is_empty() {
        return Err(AppError::Validation("Email must not be empty".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    Ok(())
}

/// Request body for an OAuth sign-in.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct OAuthRequest {
    /// Access token issued to the client by the identity provider.
    pub access_token: String,
}

/// Successful registration response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    /// ID of the newly created user.
    pub id: Uuid,
    #[schema(example = "alice@example.com")]
    pub email: String,
    pub full_name: Option<String>,
}

impl From<crate::entity::user::Model> for RegisterResponse {
    fn from(user: crate::entity::user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
        }
    }
}

/// Successful login response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// JWT bearer token.
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub token: String,
    pub user: UserResponse,
}

/// Identity reported by an OAuth provider's userinfo endpoint.
#[derive(Debug, Deserialize)]
pub struct ProviderProfile {
    /// Facebook reports `id`, Google reports `sub`.
    #[serde(alias = "sub")]
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "picture_url")]
    pub picture: Option<String>,
}

/// Google sends `picture` as a URL string; Facebook nests it under `data.url`.
fn picture_url<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        other => other
            .pointer("/data/url")
            .and_then(|u| u.as_str())
            .map(str::to_string),
    }))
}
