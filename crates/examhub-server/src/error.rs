use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use examhub_core::AccessError;
use examhub_store::StoreError;

use crate::blob::BlobError;
use crate::response::ApiResponse;

/// Everything a handler can fail with, mapped onto HTTP at the boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("upload exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Mail or blob provider failed.
    #[error("{0}")]
    Upstream(String),

    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Access(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST),
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Access(e) => e.kind(),
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::BadRequest(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Access(e) => Self::Access(e),
            StoreError::Auth(msg) => Self::Unauthorized(msg),
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::InvalidName(name) => Self::BadRequest(format!("invalid file name: {name}")),
            BlobError::Io(e) => Self::Upstream(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(detail) => tracing::error!(detail = %detail, "request failed"),
            Self::Upstream(detail) => tracing::warn!(detail = %detail, "provider call failed"),
            _ => tracing::debug!(code = self.code(), error = %self, "request rejected"),
        }
        ApiResponse::error(status, self.code(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examhub_core::ExamId;

    #[test]
    fn access_errors_keep_their_status_and_kind() {
        let err = ApiError::from(StoreError::Access(AccessError::CrossExamForbidden {
            what: "subject".into(),
            target: ExamId::Upsc,
            context: ExamId::Jee,
        }));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "CROSS_EXAM_FORBIDDEN");

        let err = ApiError::from(AccessError::not_found("question"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn store_errors_map_to_http() {
        assert_eq!(
            ApiError::from(StoreError::Auth("invalid session".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(StoreError::Conflict("email already registered".into())).status(),
            StatusCode::CONFLICT
        );
        let err = ApiError::from(StoreError::Database("disk I/O error".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "internal error");
    }

    #[test]
    fn response_uses_envelope() {
        let resp = ApiError::Unauthorized("invalid session".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
