use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::inference::ChatMessage;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CompletionRequest {
    /// Defaults to the configured chat model.
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Stream tokens as server-sent events.
    #[serde(default)]
    pub stream: bool,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ImageRequest {
    #[schema(example = "a red fox in snow")]
    pub prompt: String,
}

/// Frame payload of a streamed completion.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DeltaFrame {
    pub text: String,
}

pub fn validate_completion(req: &CompletionRequest) -> Result<(), AppError> {
    if req.messages.is_empty() {
        return Err(AppError::Validation("messages must not be empty".into()));
    }
    if let Some(bad) = req
        .messages
        .iter()
        .find(|m| !matches!(m.role.as_str(), "system" | "user" | "assistant"))
    {
        return Err(AppError::Validation(format!(
            "Unsupported message role '{}'",
            bad.role
        )));
    }
    Ok(())
}

pub fn validate_image_request(req: &ImageRequest) -> Result<(), AppError> {
    if req.prompt.trim().is_empty() {
        return Err(AppError::Validation("Prompt must not be empty".into()));
    }
    Ok(())
}
