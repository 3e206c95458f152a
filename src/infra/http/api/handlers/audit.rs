//! Audit log queries (admin only). The trail itself is append-only.

use axum::{
    extract::{Path, State},
    response::Response,
};
use serde::Deserialize;

use crate::application::{error::AppError, pagination::PageRequest, repos::AuditFilter};
use crate::domain::{roles::Permission, types::AuditOutcome};
use crate::infra::http::api::{
    extract::{ApiQuery, Authenticated, parse_optional_date},
    response,
    state::ApiState,
};

use super::parse_opt;

#[derive(Debug, Default, Deserialize)]
pub struct AuditListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub principal_id: Option<String>,
    pub action: Option<String>,
    pub entity_kind: Option<String>,
    pub entity_id: Option<String>,
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl AuditListQuery {
    fn into_filter(self) -> Result<(AuditFilter, PageRequest), AppError> {
        let text = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        let filter = AuditFilter {
            principal_id: parse_opt("principal_id", self.principal_id.as_deref())?,
            action: text(self.action),
            entity_kind: text(self.entity_kind),
            entity_id: text(self.entity_id),
            status: parse_opt::<AuditOutcome>("status", self.status.as_deref())?,
            created_after: parse_optional_date("from", self.from.as_deref())?,
            created_before: parse_optional_date("to", self.to.as_deref())?,
        };
        Ok((filter, PageRequest::new(self.page, self.limit)))
    }
}

pub async fn list(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(query): ApiQuery<AuditListQuery>,
) -> Result<Response, AppError> {
    auth.require(Permission::AuditRead)?;
    let (filter, page) = query.into_filter()?;
    let result = state.audit.list(&filter, page).await?;
    Ok(response::paged(result))
}

pub async fn get(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = id
        .trim()
        .parse::<u64>()
        .map_err(|_| AppError::bad_request(format!("Invalid id `{id}`")))?;
    auth.require(Permission::AuditRead)?;
    Ok(response::ok(state.audit.get(id).await?))
}
