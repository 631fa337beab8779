use axum::extract::{Path, State};

use examhub_core::ids::{CommentId, ResourceId, StoryId};
use examhub_core::paging::Page;
use examhub_core::ExamContext;
use examhub_store::comments::{CommentRow, CommentTarget, NewComment};

use super::{ApiResult, PageParams};
use crate::extract::{Params, Payload, Scoped};
use crate::response::ApiResponse;
use crate::server::AppState;

fn list_on(
    state: &AppState,
    ctx: &ExamContext,
    target: CommentTarget,
    params: &PageParams,
) -> ApiResult<Page<CommentRow>> {
    Ok(ApiResponse::ok(state.comments().list(ctx, &target, params.request())?))
}

fn add_on(state: &AppState, ctx: &ExamContext, target: CommentTarget, new: &NewComment) -> ApiResult<CommentRow> {
    Ok(ApiResponse::created(state.comments().add(ctx, &target, new)?))
}

pub async fn list_for_resource(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
    Params(params): Params<PageParams>,
) -> ApiResult<Page<CommentRow>> {
    list_on(&state, &ctx, CommentTarget::Resource(ResourceId::from_raw(id)), &params)
}

pub async fn add_to_resource(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
    Payload(new): Payload<NewComment>,
) -> ApiResult<CommentRow> {
    add_on(&state, &ctx, CommentTarget::Resource(ResourceId::from_raw(id)), &new)
}

pub async fn list_for_story(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
    Params(params): Params<PageParams>,
) -> ApiResult<Page<CommentRow>> {
    list_on(&state, &ctx, CommentTarget::Story(StoryId::from_raw(id)), &params)
}

pub async fn add_to_story(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
    Payload(new): Payload<NewComment>,
) -> ApiResult<CommentRow> {
    add_on(&state, &ctx, CommentTarget::Story(StoryId::from_raw(id)), &new)
}

/// Author only.
pub async fn remove(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.comments().delete(&ctx, &CommentId::from_raw(id))?;
    Ok(ApiResponse::done())
}
