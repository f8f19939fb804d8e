use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub use super::shared::Pagination;
use super::shared::{double_option, validate_model_id, validate_title};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateChatRequest {
    /// Chat title (1-256 characters).
    #[schema(example = "New Chat")]
    pub title: Option<String>,
    /// Model identifier to use for this chat.
    #[schema(example = "mistralai/Mixtral-8x7B-Instruct-v0.1")]
    pub model: Option<String>,
    /// Must equal the caller when present.
    pub user_id: Option<Uuid>,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateChatRequest {
    pub title: Option<String>,
    /// `null` clears the model.
    #[serde(default, deserialize_with = "double_option")]
    pub model: Option<Option<String>>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ChatResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "Trip ideas")]
    pub title: String,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::entity::chat::Model> for ChatResponse {
    fn from(m: crate::entity::chat::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            title: m.title,
            model: m.model,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ChatListResponse {
    pub data: Vec<ChatResponse>,
    pub pagination: Pagination,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChatListQuery {
    /// Page number (1-based, default 1).
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    pub per_page: Option<u64>,
    /// Exact title match.
    pub title: Option<String>,
    /// Exact model match.
    pub model: Option<String>,
    /// Case-insensitive title substring.
    pub search: Option<String>,
    /// One of `updated_at` (default), `created_at`, `title`.
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

pub fn validate_create_chat(req: &CreateChatRequest) -> Result<String, AppError> {
    let title = req
        .title
        .as_deref()
        .ok_or_else(|| AppError::Validation("Title is required".into()))?;
    validate_title(title)?;
    if let Some(ref model) = req.model {
        validate_model_id(model)?;
    }
    Ok(title.trim().to_string())
}

pub fn validate_update_chat(req: &UpdateChatRequest) -> Result<(), AppError> {
    if let Some(ref title) = req.title {
        validate_title(title)?;
    }
    if let Some(Some(ref model)) = req.model {
        validate_model_id(model)?;
    }
    Ok(())
}
