use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, types::Json};
use time::OffsetDateTime;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{AuditEntry, AuditFilter, AuditRepo, RepoError},
    domain::entities::{AuditRecord, FieldChanges},
    domain::types::{AuditOutcome, Role},
};

use super::{
    LIKE_ESCAPE, PostgresRepositories, contains_pattern, map_sqlx_error, opt_bind_id, opt_row_id,
    to_u64,
};

const AUDIT_COLUMNS: &str = "id, principal_id, principal_email, principal_role, action, \
    entity_kind, entity_id, ip, user_agent, request_id, changes, status, error_message, created_at";

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    principal_id: Option<i32>,
    principal_email: Option<String>,
    principal_role: Option<Role>,
    action: String,
    entity_kind: String,
    entity_id: Option<String>,
    ip: Option<String>,
    user_agent: Option<String>,
    request_id: Option<String>,
    changes: Option<Json<FieldChanges>>,
    status: AuditOutcome,
    error_message: Option<String>,
    created_at: OffsetDateTime,
}

impl From<AuditRow> for AuditRecord {
    fn from(row: AuditRow) -> Self {
        Self {
            id: to_u64(row.id),
            principal_id: opt_row_id(row.principal_id),
            principal_email: row.principal_email,
            principal_role: row.principal_role,
            action: row.action,
            entity_kind: row.entity_kind,
            entity_id: row.entity_id,
            ip: row.ip,
            user_agent: row.user_agent,
            request_id: row.request_id,
            changes: row.changes.map(|changes| changes.0),
            status: row.status,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
    qb.push(" WHERE 1=1");

    if let Some(principal_id) = filter.principal_id {
        qb.push(" AND principal_id = ");
        qb.push_bind(opt_bind_id(Some(principal_id)));
    }

    if let Some(action) = filter.action.as_ref() {
        qb.push(" AND action ILIKE ");
        qb.push_bind(contains_pattern(action));
        qb.push(LIKE_ESCAPE);
    }

    if let Some(entity_kind) = filter.entity_kind.as_ref() {
        qb.push(" AND entity_kind = ");
        qb.push_bind(entity_kind.clone());
    }

    if let Some(entity_id) = filter.entity_id.as_ref() {
        qb.push(" AND entity_id = ");
        qb.push_bind(entity_id.clone());
    }

    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }

    if let Some(after) = filter.created_after {
        qb.push(" AND created_at >= ");
        qb.push_bind(after);
    }

    if let Some(before) = filter.created_before {
        qb.push(" AND created_at <= ");
        qb.push_bind(before);
    }
}

#[async_trait]
impl AuditRepo for PostgresRepositories {
    async fn append(&self, entry: &AuditEntry) -> Result<AuditRecord, RepoError> {
        let sql = format!(
            "INSERT INTO audit_logs (principal_id, principal_email, principal_role, action, \
             entity_kind, entity_id, ip, user_agent, request_id, changes, status, \
             error_message, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {AUDIT_COLUMNS}"
        );
        let row: AuditRow = sqlx::query_as(&sql)
            .bind(opt_bind_id(entry.principal_id))
            .bind(entry.principal_email.as_deref())
            .bind(entry.principal_role)
            .bind(entry.action.as_str())
            .bind(entry.entity_kind.as_str())
            .bind(entry.entity_id.as_deref())
            .bind(entry.ip.as_deref())
            .bind(entry.user_agent.as_deref())
            .bind(entry.request_id.as_deref())
            .bind(entry.changes.as_ref().map(Json))
            .bind(entry.status)
            .bind(entry.error_message.as_deref())
            .bind(entry.created_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<AuditRecord>, RepoError> {
        let Ok(id) = i64::try_from(id) else {
            return Ok(None);
        };
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE id = $1");
        let row: Option<AuditRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(AuditRecord::from))
    }

    async fn list(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> Result<Paginated<AuditRecord>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
        push_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_logs"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(page.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<AuditRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(AuditRecord::from).collect(),
            to_u64(total),
            page,
        ))
    }
}
