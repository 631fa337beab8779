use axum::extract::{Path, State};
use serde::Deserialize;

use examhub_core::ids::{QuestionId, SubjectId, TopicId, UserId};
use examhub_core::paging::{Page, PageRequest};
use examhub_store::questions::{Difficulty, NewQuestion, QuestionFilter, QuestionPatch, QuestionRow, QuestionSort};

use super::{present, ApiResult};
use crate::error::ApiError;
use crate::extract::{Params, Payload, Scoped};
use crate::response::ApiResponse;
use crate::server::AppState;

/// Query string of `GET /questions`. Keys not listed here, `exam`
/// included, are dropped: the list is always the caller's exam.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionParams {
    #[serde(alias = "subject")]
    pub subject_id: Option<String>,
    #[serde(alias = "topic")]
    pub topic_id: Option<String>,
    pub difficulty: Option<String>,
    pub solved: Option<bool>,
    #[serde(alias = "creator", alias = "user")]
    pub user_id: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl QuestionParams {
    pub fn filter(&self) -> Result<QuestionFilter, ApiError> {
        Ok(QuestionFilter {
            subject_id: present(&self.subject_id).map(SubjectId::from_raw),
            topic_id: present(&self.topic_id).map(TopicId::from_raw),
            difficulty: present(&self.difficulty).map(str::parse::<Difficulty>).transpose()?,
            solved: self.solved,
            user_id: present(&self.user_id).map(UserId::from_raw),
            q: present(&self.q).map(str::to_string),
            sort: present(&self.sort)
                .map(str::parse::<QuestionSort>)
                .transpose()?
                .unwrap_or_default(),
        })
    }

    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

pub async fn list(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Params(params): Params<QuestionParams>,
) -> ApiResult<Page<QuestionRow>> {
    let filter = params.filter()?;
    Ok(ApiResponse::ok(state.questions().list(&ctx, &filter, params.page())?))
}

pub async fn create(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Payload(new): Payload<NewQuestion>,
) -> ApiResult<QuestionRow> {
    Ok(ApiResponse::created(state.questions().create(&ctx, &new)?))
}

/// Counts as a view.
pub async fn get(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<QuestionRow> {
    Ok(ApiResponse::ok(state.questions().view(&ctx, &QuestionId::from_raw(id))?))
}

pub async fn update(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
    Payload(patch): Payload<QuestionPatch>,
) -> ApiResult<QuestionRow> {
    Ok(ApiResponse::ok(
        state.questions().update(&ctx, &QuestionId::from_raw(id), &patch)?,
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.questions().delete(&ctx, &QuestionId::from_raw(id))?;
    Ok(ApiResponse::done())
}

pub async fn toggle_solved(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<QuestionRow> {
    Ok(ApiResponse::ok(
        state.questions().toggle_solved(&ctx, &QuestionId::from_raw(id))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_build_filter() {
        let params: QuestionParams =
            serde_json::from_value(serde_json::json!({
                "subject": "subj_1",
                "difficulty": "HARD",
                "solved": false,
                "q": " kinematics ",
                "sort": "unanswered",
                "exam": "UPSC"
            }))
            .unwrap();
        let filter = params.filter().unwrap();
        assert_eq!(filter.subject_id.unwrap().as_str(), "subj_1");
        assert_eq!(filter.difficulty, Some(Difficulty::Hard));
        assert_eq!(filter.solved, Some(false));
        assert_eq!(filter.q.as_deref(), Some("kinematics"));
        assert_eq!(filter.sort, QuestionSort::Unanswered);
    }

    #[test]
    fn unknown_sort_is_a_validation_error() {
        let params = QuestionParams {
            sort: Some("random".into()),
            ..Default::default()
        };
        let err = params.filter().unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
