//! Request extractors: bearer sessions, exam context, and JSON/query
//! bodies whose rejections use the response envelope.

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;

use examhub_core::{ExamContext, Identity};

use crate::error::ApiError;
use crate::server::AppState;

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Resolve the presented token, if any. A token that is present but
/// unknown, expired or tied to an inactive account is a 401.
fn identity(parts: &Parts, state: &AppState) -> Result<Option<(Identity, String)>, ApiError> {
    let Some(token) = bearer_token(&parts.headers) else {
        return Ok(None);
    };
    let identity = state.sessions().resolve(token)?;
    Ok(Some((identity, token.to_string())))
}

/// A signed-in caller. Used where no exam scope is involved.
pub struct Authenticated {
    pub identity: Identity,
    pub token: String,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (identity, token) = identity(parts, state)?
            .ok_or_else(|| ApiError::Unauthorized("authentication required".into()))?;
        Ok(Self { identity, token })
    }
}

/// The caller's exam context. Without a session there is no context and
/// the request fails; it never falls back to a default exam.
pub struct Scoped(pub ExamContext);

impl FromRequestParts<AppState> for Scoped {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = identity(parts, state)?.map(|(identity, _)| identity);
        let ctx = ExamContext::resolve(identity.as_ref())?;
        Ok(Self(ctx))
    }
}

/// `Json<T>` with envelope-shaped rejections.
pub struct Payload<T>(pub T);

impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query<T>` with envelope-shaped rejections.
pub struct Params<T>(pub T);

impl<T, S> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}
