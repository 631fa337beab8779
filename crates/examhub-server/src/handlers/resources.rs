use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::warn;

use examhub_core::ids::{ResourceId, SubjectId, TopicId, UserId};
use examhub_core::paging::{Page, PageRequest};
use examhub_store::resources::{NewResource, ResourceFilter, ResourceKind, ResourcePatch, ResourceRow, ResourceSort};
use examhub_store::Toggle;

use super::{present, ApiResult};
use crate::error::ApiError;
use crate::extract::{Params, Payload, Scoped};
use crate::response::ApiResponse;
use crate::server::AppState;

/// Query string of `GET /resources`; `exam` is not a filter.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceParams {
    #[serde(alias = "subject")]
    pub subject_id: Option<String>,
    #[serde(alias = "topic")]
    pub topic_id: Option<String>,
    #[serde(alias = "type")]
    pub kind: Option<String>,
    #[serde(alias = "creator", alias = "user")]
    pub user_id: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ResourceParams {
    pub fn filter(&self) -> Result<ResourceFilter, ApiError> {
        Ok(ResourceFilter {
            subject_id: present(&self.subject_id).map(SubjectId::from_raw),
            topic_id: present(&self.topic_id).map(TopicId::from_raw),
            kind: present(&self.kind).map(str::parse::<ResourceKind>).transpose()?,
            user_id: present(&self.user_id).map(UserId::from_raw),
            q: present(&self.q).map(str::to_string),
            sort: present(&self.sort)
                .map(str::parse::<ResourceSort>)
                .transpose()?
                .unwrap_or_default(),
        })
    }

    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

/// A resource plus whether the caller saved it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    #[serde(flatten)]
    pub resource: ResourceRow,
    pub is_saved: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Params(params): Params<ResourceParams>,
) -> ApiResult<Page<ResourceRow>> {
    let filter = params.filter()?;
    Ok(ApiResponse::ok(state.resources().list(&ctx, &filter, params.page())?))
}

pub async fn create(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Payload(new): Payload<NewResource>,
) -> ApiResult<ResourceRow> {
    Ok(ApiResponse::created(state.resources().create(&ctx, &new)?))
}

pub async fn get(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<ResourceView> {
    let id = ResourceId::from_raw(id);
    let repo = state.resources();
    let resource = repo.get(&ctx, &id)?;
    let is_saved = repo.is_saved(&ctx, &id)?;
    Ok(ApiResponse::ok(ResourceView { resource, is_saved }))
}

pub async fn update(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
    Payload(patch): Payload<ResourcePatch>,
) -> ApiResult<ResourceRow> {
    Ok(ApiResponse::ok(
        state.resources().update(&ctx, &ResourceId::from_raw(id), &patch)?,
    ))
}

/// Owner only. The attached file goes after the row does.
pub async fn remove(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    if let Some(public_id) = state.resources().delete(&ctx, &ResourceId::from_raw(id))? {
        if let Err(e) = state.blobs.delete(&public_id).await {
            warn!(public_id = %public_id, error = %e, "resource file not deleted");
        }
    }
    Ok(ApiResponse::done())
}

pub async fn upvote(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<Toggle> {
    Ok(ApiResponse::ok(state.resources().upvote(&ctx, &ResourceId::from_raw(id))?))
}

pub async fn save(
    State(state): State<AppState>,
    Scoped(ctx): Scoped,
    Path(id): Path<String>,
) -> ApiResult<Toggle> {
    Ok(ApiResponse::ok(state.resources().save(&ctx, &ResourceId::from_raw(id))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_build_filter() {
        let params = ResourceParams {
            kind: Some("PDF".into()),
            sort: Some("popular".into()),
            user_id: Some("usr_1".into()),
            ..Default::default()
        };
        let filter = params.filter().unwrap();
        assert_eq!(filter.kind, Some(ResourceKind::Pdf));
        assert_eq!(filter.sort, ResourceSort::Popular);
        assert_eq!(filter.user_id.unwrap().as_str(), "usr_1");
    }

    #[test]
    fn unknown_kind_rejected() {
        let params = ResourceParams {
            kind: Some("podcast".into()),
            ..Default::default()
        };
        assert_eq!(params.filter().unwrap_err().code(), "VALIDATION_ERROR");
    }
}
