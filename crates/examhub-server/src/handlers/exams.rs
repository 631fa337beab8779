use axum::extract::{Path, State};
use serde::Serialize;

use examhub_core::exam::ExamId;
use examhub_core::gate;
use examhub_store::subjects::SubjectRow;

use super::ApiResult;
use crate::extract::Scoped;
use crate::response::ApiResponse;
use crate::server::AppState;

/// Registry entry as shown on sign-up.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSummary {
    pub id: ExamId,
    pub name: &'static str,
    pub full_name: &'static str,
    pub subjects: Vec<&'static str>,
}

/// Public registry listing.
pub async fn list_exams() -> ApiResult<Vec<ExamSummary>> {
    let exams = ExamId::ALL
        .iter()
        .map(|exam| {
            let info = exam.info();
            ExamSummary {
                id: *exam,
                name: info.name,
                full_name: info.full_name,
                subjects: info.subjects.iter().map(|s| s.name).collect(),
            }
        })
        .collect();
    Ok(ApiResponse::ok(exams))
}

/// The path exam must be the caller's own; any other is rejected, not
/// silently swapped.
pub async fn exam_subjects(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(exam): Path<String>,
) -> ApiResult<Vec<SubjectRow>> {
    gate::ensure_path_exam(&ctx, &exam)?;
    Ok(ApiResponse::ok(state.subjects().list(&ctx)?))
}

pub async fn list_subjects(State(state): State<AppState>, Scoped(ctx): Scoped) -> ApiResult<Vec<SubjectRow>> {
    Ok(ApiResponse::ok(state.subjects().list(&ctx)?))
}

pub async fn get_subject(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(slug): Path<String>,
) -> ApiResult<SubjectRow> {
    Ok(ApiResponse::ok(state.subjects().get_by_slug(&ctx, &slug)?))
}
