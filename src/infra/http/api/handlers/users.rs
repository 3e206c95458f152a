use axum::{
    extract::{Path, State},
    response::Response,
};
use marketlens_api_types::{UserCreateRequest, UserUpdateRequest};
use serde::Deserialize;

use crate::application::{
    error::AppError,
    pagination::PageRequest,
    repos::PrincipalFilter,
};
use crate::domain::{roles::Permission, types::Role};
use crate::infra::http::api::{
    extract::{ApiJson, ApiQuery, Authenticated, parse_id},
    response,
    state::ApiState,
};

use super::{PageQuery, parse_opt};

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role: Option<String>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

pub async fn me(
    State(state): State<ApiState>,
    Authenticated(actor): Authenticated,
) -> Result<Response, AppError> {
    let user = state.users.get(actor.id()).await?;
    Ok(response::ok(user))
}

pub async fn list(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Response, AppError> {
    auth.require(Permission::UsersManage)?;
    let filter = PrincipalFilter {
        role: parse_opt::<Role>("role", query.role.as_deref())?,
        active: query.active,
        search: query.search.filter(|value| !value.trim().is_empty()),
    };
    let page = state
        .users
        .list(&filter, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(response::paged(page))
}

pub async fn by_role(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(role): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Response, AppError> {
    auth.require(Permission::UsersManage)?;
    let role = role
        .parse::<Role>()
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    let page = state.users.by_role(role, query.request()).await?;
    Ok(response::paged(page))
}

pub async fn get(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    auth.require(Permission::UsersManage)?;
    Ok(response::ok(state.users.get(id).await?))
}

pub async fn create(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(request): ApiJson<UserCreateRequest>,
) -> Result<Response, AppError> {
    let actor = auth.require(Permission::UsersManage)?;
    let user = state.users.create(&actor, request).await?;
    Ok(response::created(user))
}

pub async fn update(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UserUpdateRequest>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::UsersManage)?;
    let user = state.users.update(&actor, id, request).await?;
    Ok(response::ok(user))
}

pub async fn delete(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::UsersManage)?;
    state.users.deactivate(&actor, id).await?;
    Ok(response::message("User deactivated"))
}
