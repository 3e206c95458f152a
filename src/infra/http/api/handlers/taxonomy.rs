//! Categories and authors. Reads are public; writes need an editor or admin.

use axum::{
    extract::{Path, State},
    response::Response,
};
use marketlens_api_types::{AuthorRequest, CategoryRequest};
use serde::Deserialize;

use crate::application::{error::AppError, pagination::PageRequest};
use crate::domain::roles::Permission;
use crate::infra::http::api::{
    extract::{ApiJson, ApiQuery, Authenticated, Caller, parse_id},
    response,
    state::ApiState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CategoryListQuery {
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub include_inactive: Option<bool>,
}

/// Inactive rows are only listed for privileged callers that ask for them.
fn include_inactive(caller: &Caller, requested: Option<bool>) -> bool {
    caller.is_privileged() && requested.unwrap_or(false)
}

pub async fn list_categories(
    State(state): State<ApiState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<CategoryListQuery>,
) -> Result<Response, AppError> {
    let categories = state
        .categories
        .list(include_inactive(&caller, query.include_inactive))
        .await?;
    Ok(response::ok(categories))
}

pub async fn get_category(
    State(state): State<ApiState>,
    caller: Caller,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let category = state
        .categories
        .get_by_slug(&slug, caller.is_privileged())
        .await?;
    Ok(response::ok(category))
}

pub async fn create_category(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(request): ApiJson<CategoryRequest>,
) -> Result<Response, AppError> {
    let actor = auth.require(Permission::TaxonomyWrite)?;
    let category = state.categories.create(&actor, request).await?;
    Ok(response::created(category))
}

pub async fn update_category(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<CategoryRequest>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::TaxonomyWrite)?;
    let category = state.categories.update(&actor, id, request).await?;
    Ok(response::ok(category))
}

pub async fn delete_category(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::TaxonomyWrite)?;
    state.categories.delete(&actor, id).await?;
    Ok(response::no_content())
}

pub async fn list_authors(
    State(state): State<ApiState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<AuthorListQuery>,
) -> Result<Response, AppError> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let page = state
        .authors
        .list(
            search,
            include_inactive(&caller, query.include_inactive),
            PageRequest::new(query.page, query.limit),
        )
        .await?;
    Ok(response::paged(page))
}

/// Lookup by numeric id or slug.
pub async fn get_author(
    State(state): State<ApiState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let author = state
        .authors
        .get(&reference, caller.is_privileged())
        .await?;
    Ok(response::ok(author))
}

pub async fn create_author(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(request): ApiJson<AuthorRequest>,
) -> Result<Response, AppError> {
    let actor = auth.require(Permission::TaxonomyWrite)?;
    let author = state.authors.create(&actor, request).await?;
    Ok(response::created(author))
}

pub async fn update_author(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AuthorRequest>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::TaxonomyWrite)?;
    let author = state.authors.update(&actor, id, request).await?;
    Ok(response::ok(author))
}

pub async fn delete_author(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::TaxonomyWrite)?;
    state.authors.delete(&actor, id).await?;
    Ok(response::no_content())
}
