use axum::extract::DefaultBodyLimit;
use axum::extract::multipart::{Field, Multipart, MultipartError};

use crate::error::AppError;
use crate::utils::filename::{display_file_name, guess_mime};

/// Request body limit for multipart routes: the upload cap plus room for the
/// other form fields, so oversize files reach the handler's own 413 check.
pub fn upload_body_limit(max_upload_bytes: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(body_limit_bytes(max_upload_bytes))
}

fn body_limit_bytes(max_upload_bytes: u64) -> usize {
    usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(1024 * 1024)
}

/// A fully buffered `file` field.
pub struct FilePart {
    pub file_name: String,
    /// Declared MIME type, else guessed from the file name.
    pub mime: String,
    pub data: Vec<u8>,
}

impl FilePart {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::Validation(format!("Multipart error: {}", err.body_text()))
}

pub async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>, AppError> {
    multipart.next_field().await.map_err(multipart_error)
}

/// Buffer a file field, failing with 413 as soon as it passes `max_bytes`.
pub async fn read_file(mut field: Field<'_>, max_bytes: u64) -> Result<FilePart, AppError> {
    let file_name = display_file_name(field.file_name().unwrap_or_default());
    let mime = field
        .content_type()
        .map(str::to_string)
        .filter(|m| !m.is_empty() && m != "application/octet-stream")
        .unwrap_or_else(|| guess_mime(&file_name));

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        let total = data.len().saturating_add(chunk.len()) as u64;
        if total > max_bytes {
            return Err(AppError::PayloadTooLarge { limit: max_bytes });
        }
        data.extend_from_slice(&chunk);
    }

    Ok(FilePart {
        file_name,
        mime,
        data,
    })
}

/// Read a text field, trimmed; empty values become `None`.
pub async fn read_text(field: Field<'_>) -> Result<Option<String>, AppError> {
    let name = field.name().unwrap_or_default().to_string();
    let text = field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read {name}: {}", e.body_text())))?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}
