use chrono::{DateTime, Utc};
use common::ContentKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

use super::shared::validate_metadata;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateMessageRequest {
    #[schema(example = "Hello!")]
    pub content: Option<String>,
    /// `user` or `assistant`.
    #[schema(example = "user")]
    pub role: Option<String>,
    /// One of text (default), image, pdf, document, spreadsheet, file.
    pub content_type: Option<String>,
    /// JSON object, default `{}`.
    pub metadata: Option<serde_json::Value>,
    /// Client correlation id, echoed back at `metadata.client_ref`.
    pub client_ref: Option<Uuid>,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateMessageRequest {
    pub content: Option<String>,
    /// Replaces the whole metadata object.
    pub metadata: Option<serde_json::Value>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub chat_id: Uuid,
    #[schema(example = "user")]
    pub role: String,
    pub content: String,
    #[schema(example = "text")]
    pub content_type: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<crate::entity::message::Model> for MessageResponse {
    fn from(m: crate::entity::message::Model) -> Self {
        Self {
            id: m.id,
            chat_id: m.chat_id,
            role: m.role,
            content: m.content,
            content_type: m.content_type,
            metadata: m.metadata,
            created_at: m.created_at,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MessageListQuery {
    /// Filter by role.
    pub role: Option<String>,
    /// Filter by content type.
    pub content_type: Option<String>,
    /// `asc` (default) or `desc` by creation time.
    pub sort_order: Option<String>,
    /// Maximum number of messages (1-500).
    pub limit: Option<u64>,
}

pub fn validate_role(role: &str) -> Result<(), AppError> {
    match role {
        ROLE_USER | ROLE_ASSISTANT => Ok(()),
        _ => Err(AppError::Validation(
            "role must be one of: user, assistant".into(),
        )),
    }
}

pub fn parse_content_kind(raw: &str) -> Result<ContentKind, AppError> {
    raw.parse::<ContentKind>().map_err(AppError::Validation)
}

/// Validated fields of a [`CreateMessageRequest`].
pub struct NewMessage {
    pub role: String,
    pub content: String,
    pub content_type: ContentKind,
    pub metadata: serde_json::Value,
}

pub fn validate_create_message(req: CreateMessageRequest) -> Result<NewMessage, AppError> {
    let content = req
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Content must not be empty".into()))?;
    let role = req
        .role
        .ok_or_else(|| AppError::Validation("Role is required".into()))?;
    validate_role(&role)?;
    let content_type = match req.content_type.as_deref() {
        Some(raw) => parse_content_kind(raw)?,
        None => ContentKind::Text,
    };
    let mut metadata = req
        .metadata
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    validate_metadata(&metadata)?;
    if let (Some(client_ref), Some(obj)) = (req.client_ref, metadata.as_object_mut()) {
        obj.insert("client_ref".into(), client_ref.to_string().into());
    }
    Ok(NewMessage {
        role,
        content,
        content_type,
        metadata,
    })
}

pub fn validate_update_message(req: &UpdateMessageRequest) -> Result<(), AppError> {
    if let Some(ref content) = req.content
        && content.trim().is_empty()
    {
        return Err(AppError::Validation("Content must not be empty".into()));
    }
    if let Some(ref metadata) = req.metadata {
        validate_metadata(metadata)?;
    }
    Ok(())
}
