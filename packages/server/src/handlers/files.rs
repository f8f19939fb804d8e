use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use common::storage::ObjectKey;
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::state::AppState;
use crate::utils::filename::guess_mime;

#[utoipa::path(
    get,
    path = "/api/v1/files/{key}",
    tag = "Uploads",
    operation_id = "getFile",
    summary = "Download a stored object",
    description = "Streams an object from the object store. Public: object keys are unguessable. \
        `Content-Type` is derived from the key's extension.",
    params(("key" = String, Path, description = "Object key, e.g. `uploaded/{uuid}.png`")),
    responses(
        (status = 200, description = "Object bytes"),
        (status = 400, description = "Malformed key (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Object not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let key = ObjectKey::parse(&key)?;
    let reader = state.objects.get_stream(&key).await?;

    Ok((
        [
            (header::CONTENT_TYPE, guess_mime(key.as_str())),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable".to_string()),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}
