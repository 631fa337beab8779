use axum::extract::{Path, State};
use serde::Deserialize;

use examhub_core::ids::{StoryId, UserId};
use examhub_core::paging::{Page, PageRequest};
use examhub_store::stories::{NewStory, StoryPatch, StoryRow};
use examhub_store::Toggle;

use super::{present, ApiResult};
use crate::extract::{Params, Payload, Scoped};
use crate::response::ApiResponse;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryParams {
    #[serde(alias = "creator", alias = "user")]
    pub user_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Params(params): Params<StoryParams>,
) -> ApiResult<Page<StoryRow>> {
    let author = present(&params.user_id).map(UserId::from_raw);
    let page = PageRequest::new(params.page, params.limit);
    Ok(ApiResponse::ok(state.stories().list(&ctx, author.as_ref(), page)?))
}

pub async fn create(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Payload(new): Payload<NewStory>,
) -> ApiResult<StoryRow> {
    Ok(ApiResponse::created(state.stories().create(&ctx, &new)?))
}

pub async fn get(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<StoryRow> {
    Ok(ApiResponse::ok(state.stories().get(&ctx, &StoryId::from_raw(id))?))
}

pub async fn update(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
    Payload(patch): Payload<StoryPatch>,
) -> ApiResult<StoryRow> {
    Ok(ApiResponse::ok(state.stories().update(&ctx, &StoryId::from_raw(id), &patch)?))
}

pub async fn remove(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.stories().delete(&ctx, &StoryId::from_raw(id))?;
    Ok(ApiResponse::done())
}

pub async fn like(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<Toggle> {
    Ok(ApiResponse::ok(state.stories().like(&ctx, &StoryId::from_raw(id))?))
}
