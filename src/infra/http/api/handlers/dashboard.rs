use axum::{extract::State, response::Response};
use serde::Deserialize;

use crate::application::error::AppError;
use crate::domain::roles::Permission;
use crate::infra::http::api::{
    extract::{ApiQuery, Authenticated},
    response,
    state::ApiState,
};

const MAX_ACTIVITY: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

pub async fn stats(
    State(state): State<ApiState>,
    auth: Authenticated,
) -> Result<Response, AppError> {
    auth.require(Permission::DashboardView)?;
    Ok(response::ok(state.dashboard.stats().await?))
}

pub async fn activity(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> Result<Response, AppError> {
    auth.require(Permission::DashboardView)?;
    let limit = query.limit.map(|limit| limit.clamp(1, MAX_ACTIVITY));
    Ok(response::ok(state.dashboard.activity(limit).await?))
}
