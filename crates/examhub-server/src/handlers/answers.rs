use axum::extract::{Path, State};

use examhub_core::ids::{AnswerId, QuestionId};
use examhub_core::paging::Page;
use examhub_store::answers::{AnswerPatch, AnswerRow, NewAnswer};
use examhub_store::Toggle;

use super::{ApiResult, PageParams};
use crate::extract::{Params, Payload, Scoped};
use crate::response::ApiResponse;
use crate::server::AppState;

pub async fn list(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(question_id): Path<String>,
    Params(params): Params<PageParams>,
) -> ApiResult<Page<AnswerRow>> {
    let page = state
        .answers()
        .list_for_question(&ctx, &QuestionId::from_raw(question_id), params.request())?;
    Ok(ApiResponse::ok(page))
}

pub async fn create(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(question_id): Path<String>,
    Payload(new): Payload<NewAnswer>,
) -> ApiResult<AnswerRow> {
    let answer = state
        .answers()
        .create(&ctx, &QuestionId::from_raw(question_id), &new)?;
    Ok(ApiResponse::created(answer))
}

pub async fn update(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
    Payload(patch): Payload<AnswerPatch>,
) -> ApiResult<AnswerRow> {
    Ok(ApiResponse::ok(state.answers().update(&ctx, &AnswerId::from_raw(id), &patch)?))
}

pub async fn remove(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.answers().delete(&ctx, &AnswerId::from_raw(id))?;
    Ok(ApiResponse::done())
}

/// Only the question's owner may accept.
pub async fn accept(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<AnswerRow> {
    Ok(ApiResponse::ok(state.answers().accept(&ctx, &AnswerId::from_raw(id))?))
}

pub async fn upvote(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<Toggle> {
    Ok(ApiResponse::ok(state.answers().upvote(&ctx, &AnswerId::from_raw(id))?))
}
