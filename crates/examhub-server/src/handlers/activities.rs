use axum::extract::State;
use serde::Serialize;

use examhub_core::paging::Page;
use examhub_store::activities::ActivityRow;

use super::{ApiResult, PageParams};
use crate::extract::{Authenticated, Params};
use crate::response::ApiResponse;
use crate::server::AppState;

/// Notifications are personal, not exam content: they follow the user
/// across exam changes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFeed {
    #[serde(flatten)]
    pub page: Page<ActivityRow>,
    pub unread: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: usize,
}

pub async fn list(
    State(state): State<AppState>,
    auth: Authenticated,
    Params(params): Params<PageParams>,
) -> ApiResult<ActivityFeed> {
    let repo = state.activities();
    let page = repo.list(&auth.identity.user_id, params.request())?;
    let unread = repo.unread_count(&auth.identity.user_id)?;
    Ok(ApiResponse::ok(ActivityFeed { page, unread }))
}

pub async fn mark_read(State(state): State<AppState>, auth: Authenticated) -> ApiResult<MarkedRead> {
    let updated = state.activities().mark_all_read(&auth.identity.user_id)?;
    Ok(ApiResponse::ok(MarkedRead { updated }))
}
