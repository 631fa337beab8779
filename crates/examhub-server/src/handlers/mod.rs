//! HTTP handlers organized by domain.

pub mod activities;
pub mod answers;
pub mod auth;
pub mod comments;
pub mod exams;
pub mod questions;
pub mod resources;
pub mod stories;
pub mod uploads;
pub mod users;

use serde::Deserialize;

use examhub_core::paging::PageRequest;

use crate::error::ApiError;
use crate::response::ApiResponse;

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// Plain `?page=&limit=`.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

/// Empty or whitespace query values count as absent.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Run CPU-bound credential work off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_clamp() {
        let params = PageParams {
            page: Some(0),
            limit: Some(500),
        };
        assert_eq!(params.request(), PageRequest::new(Some(1), Some(50)));
    }

    #[test]
    fn blank_values_are_absent() {
        assert_eq!(present(&Some("  ".into())), None);
        assert_eq!(present(&Some(" jee ".into())), Some("jee"));
        assert_eq!(present(&None), None);
    }

    #[tokio::test]
    async fn blocking_returns_value() {
        assert_eq!(blocking(|| 2 + 2).await.unwrap(), 4);
    }
}
