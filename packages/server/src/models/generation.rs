use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub use super::shared::Pagination;
use super::shared::{validate_metadata, validate_model_id};

pub const STATUS_COMPLETED: &str = "completed";
pub const DEFAULT_WIDTH: i32 = 1024;
pub const DEFAULT_HEIGHT: i32 = 768;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateGenerationRequest {
    /// Owned chat the artifact belongs to.
    pub chat_id: Uuid,
    pub prompt: String,
    /// Public URL of the artifact.
    pub url: String,
    pub model: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// Default `completed`.
    pub status: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateGenerationRequest {
    pub status: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct GenerationResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Uuid,
    #[schema(example = "a red fox in snow")]
    pub prompt: String,
    pub url: String,
    #[schema(example = "black-forest-labs/FLUX.1-schnell-Free")]
    pub model: String,
    pub width: i32,
    pub height: i32,
    #[schema(example = "completed")]
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<crate::entity::generation::Model> for GenerationResponse {
    fn from(m: crate::entity::generation::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            chat_id: m.chat_id,
            prompt: m.prompt,
            url: m.url,
            model: m.model,
            width: m.width,
            height: m.height,
            status: m.status,
            metadata: m.metadata,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct GenerationListResponse {
    pub data: Vec<GenerationResponse>,
    pub pagination: Pagination,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GenerationListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub chat_id: Option<Uuid>,
    pub status: Option<String>,
    pub model: Option<String>,
}

fn validate_status(status: &str) -> Result<(), AppError> {
    if status.trim().is_empty() || status.len() > 32 {
        return Err(AppError::Validation("Status must be 1-32 characters".into()));
    }
    Ok(())
}

fn validate_dimension(value: Option<i32>, name: &str) -> Result<(), AppError> {
    if let Some(v) = value
        && !(1..=8192).contains(&v)
    {
        return Err(AppError::Validation(format!("{name} must be 1-8192")));
    }
    Ok(())
}

pub fn validate_create_generation(req: &CreateGenerationRequest) -> Result<(), AppError> {
    if req.prompt.trim().is_empty() {
        return Err(AppError::Validation("Prompt must not be empty".into()));
    }
    if req.url.trim().is_empty() {
        return Err(AppError::Validation("URL must not be empty".into()));
    }
    if let Some(ref model) = req.model {
        validate_model_id(model)?;
    }
    validate_dimension(req.width, "Width")?;
    validate_dimension(req.height, "Height")?;
    if let Some(ref status) = req.status {
        validate_status(status)?;
    }
    if let Some(ref metadata) = req.metadata {
        validate_metadata(metadata)?;
    }
    Ok(())
}

pub fn validate_update_generation(req: &UpdateGenerationRequest) -> Result<(), AppError> {
    if let Some(ref status) = req.status {
        validate_status(status)?;
    }
    if let Some(ref metadata) = req.metadata {
        validate_metadata(metadata)?;
    }
    Ok(())
}
