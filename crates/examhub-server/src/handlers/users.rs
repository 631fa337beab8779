use axum::extract::{Path, State};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use examhub_core::ids::UserId;
use examhub_core::paging::Page;
use examhub_core::{gate, validation};
use examhub_store::resources::ResourceRow;
use examhub_store::users::{DeletionSummary, ProfilePatch, PublicProfile, UserRow};

use super::auth::{check, hash};
use super::{ApiResult, PageParams};
use crate::error::ApiError;
use crate::extract::{Authenticated, Params, Payload, Scoped};
use crate::response::ApiResponse;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangeExamRequest {
    pub exam: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(alias = "current")]
    pub current_password: String,
    #[serde(alias = "new")]
    pub new_password: String,
}

pub async fn me(State(state): State<AppState>, auth: Authenticated) -> ApiResult<UserRow> {
    Ok(ApiResponse::ok(state.users().get(&auth.identity.user_id)?))
}

/// Profile fields only; an `exam` in the body is dropped by the
/// deserializer. The exam changes through `PUT /users/me/exam`.
pub async fn update_me(
    State(state): State<AppState>,
    auth: Authenticated,
    Payload(patch): Payload<ProfilePatch>,
) -> ApiResult<UserRow> {
    let update = state.users().update_profile(&auth.identity.user_id, &patch)?;
    if let Some(public_id) = &update.stale_avatar {
        if let Err(e) = state.blobs.delete(public_id).await {
            warn!(public_id = %public_id, error = %e, "stale avatar not deleted");
        }
    }
    Ok(ApiResponse::ok(update.user))
}

#[instrument(skip_all, fields(user_id = %auth.identity.user_id))]
pub async fn change_exam(
    State(state): State<AppState>,
    auth: Authenticated,
    Payload(req): Payload<ChangeExamRequest>,
) -> ApiResult<UserRow> {
    let exam = gate::exam_for_change(&req.exam)?;
    Ok(ApiResponse::ok(state.users().change_exam(&auth.identity.user_id, exam)?))
}

#[instrument(skip_all, fields(user_id = %auth.identity.user_id))]
pub async fn change_password(
    State(state): State<AppState>,
    auth: Authenticated,
    Payload(req): Payload<ChangePasswordRequest>,
) -> ApiResult<serde_json::Value> {
    validation::password(&req.new_password)?;
    let users = state.users();
    let stored = users.password_hash(&auth.identity.user_id)?;
    if !check(req.current_password, stored).await? {
        return Err(ApiError::Unauthorized("current password is incorrect".into()));
    }
    let password_hash = hash(req.new_password).await?;
    users.set_password(&auth.identity.user_id, &password_hash)?;
    let revoked = state.sessions().revoke_others(&auth.identity.user_id, &auth.token)?;
    info!(revoked, "password changed");
    Ok(ApiResponse::done())
}

/// Delete the account and its content. Blob cleanup happens after the
/// rows are gone and never fails the request.
#[instrument(skip_all, fields(user_id = %auth.identity.user_id))]
pub async fn delete_me(State(state): State<AppState>, auth: Authenticated) -> ApiResult<DeletionSummary> {
    let summary = state.users().delete_cascade(&auth.identity.user_id)?;
    for public_id in &summary.orphaned_blobs {
        if let Err(e) = state.blobs.delete(public_id).await {
            warn!(public_id = %public_id, error = %e, "orphaned blob not deleted");
        }
    }
    Ok(ApiResponse::ok(summary))
}

pub async fn saved_resources(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Params(params): Params<PageParams>,
) -> ApiResult<Page<ResourceRow>> {
    Ok(ApiResponse::ok(state.resources().saved(&ctx, params.request())?))
}

/// Public; carries no exam-scoped content.
pub async fn public_profile(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PublicProfile> {
    Ok(ApiResponse::ok(state.users().public_profile(&UserId::from_raw(id))?))
}
