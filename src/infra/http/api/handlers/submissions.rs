use axum::{
    extract::{Path, State},
    response::Response,
};
use marketlens_api_types::{SubmissionCreateRequest, SubmissionUpdateRequest};
use serde::Deserialize;

use crate::application::{
    error::AppError,
    pagination::PageRequest,
    repos::{SortDirection, SubmissionFilter},
    submissions::parse_sort,
};
use crate::domain::{
    roles::Permission,
    types::{SubmissionCategory, SubmissionStatus},
};
use crate::infra::http::api::{
    extract::{ApiJson, ApiQuery, Authenticated, Caller, parse_id, parse_optional_date},
    response,
    state::ApiState,
};

use super::parse_opt;

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// `submitted_at` or a whitelisted payload field.
    pub sort: Option<String>,
    /// `asc` or `desc` (default).
    pub order: Option<String>,
}

fn parse_direction(raw: Option<&str>) -> Result<SortDirection, AppError> {
    match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("desc") => Ok(SortDirection::Desc),
        Some("asc") => Ok(SortDirection::Asc),
        Some(other) => Err(AppError::bad_request(format!(
            "Invalid value for `order`: {other}"
        ))),
    }
}

impl SubmissionListQuery {
    fn into_filter(self) -> Result<(SubmissionFilter, PageRequest), AppError> {
        let filter = SubmissionFilter {
            category: parse_opt::<SubmissionCategory>("category", self.category.as_deref())?,
            status: parse_opt::<SubmissionStatus>("status", self.status.as_deref())?,
            search: self.search.filter(|value| !value.trim().is_empty()),
            submitted_after: parse_optional_date("from", self.from.as_deref())?,
            submitted_before: parse_optional_date("to", self.to.as_deref())?,
            sort: parse_sort(self.sort.as_deref())?,
            direction: parse_direction(self.order.as_deref())?,
        };
        Ok((filter, PageRequest::new(self.page, self.limit)))
    }
}

/// Public intake endpoint; CSRF protection applies as for any unsafe request.
pub async fn submit(
    State(state): State<ApiState>,
    caller: Caller,
    ApiJson(request): ApiJson<SubmissionCreateRequest>,
) -> Result<Response, AppError> {
    let submission = state.submissions.submit(request, &caller.meta).await?;
    Ok(response::created(submission))
}

pub async fn list(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(query): ApiQuery<SubmissionListQuery>,
) -> Result<Response, AppError> {
    auth.require(Permission::SubmissionsManage)?;
    let (filter, page) = query.into_filter()?;
    let result = state.submissions.list(&filter, page).await?;
    Ok(response::paged(result))
}

pub async fn get(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    auth.require(Permission::SubmissionsManage)?;
    Ok(response::ok(state.submissions.get(id).await?))
}

pub async fn update(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<SubmissionUpdateRequest>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::SubmissionsManage)?;
    let submission = state.submissions.update(&actor, id, request).await?;
    Ok(response::ok(submission))
}

pub async fn delete(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::SubmissionsManage)?;
    state.submissions.delete(&actor, id).await?;
    Ok(response::no_content())
}
