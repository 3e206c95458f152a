use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{NewPrincipal, PrincipalFilter, PrincipalsRepo, RepoError},
    domain::entities::PrincipalRecord,
    domain::types::Role,
};

use super::{
    LIKE_ESCAPE, PostgresRepositories, bind_id, contains_pattern, map_sqlx_error, row_id, to_u64,
};

const PRINCIPAL_COLUMNS: &str =
    "id, email, password_hash, name, role, active, last_login_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: i32,
    email: String,
    password_hash: String,
    name: String,
    role: Role,
    active: bool,
    last_login_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PrincipalRow> for PrincipalRecord {
    fn from(row: PrincipalRow) -> Self {
        Self {
            id: row_id(row.id),
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: row.role,
            active: row.active,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PrincipalFilter) {
    qb.push(" WHERE 1=1");
    if let Some(role) = filter.role {
        qb.push(" AND role = ");
        qb.push_bind(role);
    }
    if let Some(active) = filter.active {
        qb.push(" AND active = ");
        qb.push_bind(active);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim)
        && !search.is_empty()
    {
        let pattern = contains_pattern(search);
        qb.push(" AND (email ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(LIKE_ESCAPE);
        qb.push(" OR name ILIKE ");
        qb.push_bind(pattern);
        qb.push(LIKE_ESCAPE);
        qb.push(")");
    }
}

#[async_trait]
impl PrincipalsRepo for PostgresRepositories {
    async fn find_by_id(&self, id: u32) -> Result<Option<PrincipalRecord>, RepoError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1");
        let row: Option<PrincipalRow> = sqlx::query_as(&sql)
            .bind(bind_id(id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PrincipalRecord::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>, RepoError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        let row: Option<PrincipalRow> = sqlx::query_as(&sql)
            .bind(email.trim())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PrincipalRecord::from))
    }

    async fn list(
        &self,
        filter: &PrincipalFilter,
        page: PageRequest,
    ) -> Result<Paginated<PrincipalRecord>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!("SELECT {PRINCIPAL_COLUMNS} FROM users"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(page.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<PrincipalRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(PrincipalRecord::from).collect(),
            to_u64(total),
            page,
        ))
    }

    async fn create(&self, principal: &NewPrincipal) -> Result<PrincipalRecord, RepoError> {
        let sql = format!(
            "INSERT INTO users (email, password_hash, name, role) \
             VALUES ($1, $2, $3, $4) RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row: PrincipalRow = sqlx::query_as(&sql)
            .bind(principal.email.as_str())
            .bind(principal.password_hash.as_str())
            .bind(principal.name.as_str())
            .bind(principal.role)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(&self, principal: &PrincipalRecord) -> Result<PrincipalRecord, RepoError> {
        let sql = format!(
            "UPDATE users SET email = $1, password_hash = $2, name = $3, role = $4, \
             active = $5, updated_at = now() WHERE id = $6 RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row: Option<PrincipalRow> = sqlx::query_as(&sql)
            .bind(principal.email.as_str())
            .bind(principal.password_hash.as_str())
            .bind(principal.name.as_str())
            .bind(principal.role)
            .bind(principal.active)
            .bind(bind_id(principal.id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(PrincipalRecord::from).ok_or(RepoError::NotFound)
    }

    async fn record_login(&self, id: u32, at: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(bind_id(id)?)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
