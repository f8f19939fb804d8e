use serde::Serialize;
use uuid::Uuid;

/// Multipart form accepted by `POST /upload` (documentation only).
#[allow(dead_code)]
#[derive(utoipa::ToSchema)]
pub struct UploadForm {
    /// The file to store.
    #[schema(format = Binary, value_type = String)]
    pub file: Vec<u8>,
    /// MIME type override.
    pub file_type: Option<String>,
    /// `true` for AI-produced artifacts (stored under `generated/`).
    pub is_generated: Option<bool>,
    /// Prompt recorded on the generation; defaults to the file name.
    pub prompt: Option<String>,
    /// Owned chat to attach a generation record to.
    pub chat_id: Option<Uuid>,
    /// Model recorded on the generation; default `upload`.
    pub model: Option<String>,
}

/// Multipart form accepted by `POST /chats/{id}/attachments` (documentation only).
#[allow(dead_code)]
#[derive(utoipa::ToSchema)]
pub struct AttachmentForm {
    #[schema(format = Binary, value_type = String)]
    pub file: Vec<u8>,
    /// Question about the file; a per-kind default is used when empty.
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub client_ref: Option<Uuid>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    /// Public URL of the stored object.
    pub url: String,
    #[schema(example = "uploaded/0190c9a4-8e61-7b5e-9d2a-1f3c5e7a9b0d.png")]
    pub key: String,
    /// SHA-256 of the content, hex encoded.
    pub content_hash: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<Uuid>,
}
