use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use examhub_core::blob::BlobHandle;

use super::{present, ApiResult};
use crate::error::ApiError;
use crate::extract::{Params, Scoped};
use crate::response::ApiResponse;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
}

/// Raw request body in, blob handle out. The handle is recorded against
/// the caller and can be attached once, by them, in a later request.
#[instrument(skip_all, fields(user_id = %ctx.user_id()))]
pub async fn upload(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Params(params): Params<UploadParams>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<BlobHandle> {
    let limit = state.config.max_upload_bytes;
    let body = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(limit)
        } else {
            ApiError::BadRequest(e.body_text())
        }
    })?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("upload body is empty".into()));
    }
    if body.len() > limit {
        return Err(ApiError::PayloadTooLarge(limit));
    }

    let filename = present(&params.filename).unwrap_or("upload.bin");
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let size = body.len();
    let handle = state.blobs.upload(body, filename, content_type).await?;
    if let Err(e) = state.uploads().record(&ctx, &handle) {
        if let Err(cleanup) = state.blobs.delete(&handle.public_id).await {
            warn!(public_id = %handle.public_id, error = %cleanup, "unrecorded blob not deleted");
        }
        return Err(e.into());
    }
    info!(public_id = %handle.public_id, size, "file uploaded");
    Ok(ApiResponse::created(handle))
}
