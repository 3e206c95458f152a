use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder, types::Json};
use time::OffsetDateTime;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{
        NewSubmission, RepoError, SortDirection, SubmissionFilter, SubmissionSort,
        SubmissionsRepo,
    },
    domain::entities::{FormSubmissionRecord, SubmissionMetadata},
    domain::types::{SubmissionCategory, SubmissionStatus},
};

use super::{
    LIKE_ESCAPE, PostgresRepositories, bind_id, contains_pattern, map_sqlx_error, opt_bind_id,
    opt_row_id, row_id, to_u64,
};

const SUBMISSION_COLUMNS: &str = "id, category, payload, submitted_at, ip, user_agent, referrer, \
    status, processed_at, processed_by, notes";

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i32,
    category: SubmissionCategory,
    payload: Json<Value>,
    submitted_at: OffsetDateTime,
    ip: Option<String>,
    user_agent: Option<String>,
    referrer: Option<String>,
    status: SubmissionStatus,
    processed_at: Option<OffsetDateTime>,
    processed_by: Option<i32>,
    notes: Option<String>,
}

impl From<SubmissionRow> for FormSubmissionRecord {
    fn from(row: SubmissionRow) -> Self {
        Self {
            id: row_id(row.id),
            category: row.category,
            payload: row.payload.0,
            metadata: SubmissionMetadata {
                submitted_at: row.submitted_at,
                ip: row.ip,
                user_agent: row.user_agent,
                referrer: row.referrer,
            },
            status: row.status,
            processed_at: row.processed_at,
            processed_by: opt_row_id(row.processed_by),
            notes: row.notes,
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &SubmissionFilter) {
    qb.push(" WHERE 1=1");
    if let Some(category) = filter.category {
        qb.push(" AND category = ");
        qb.push_bind(category);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim)
        && !search.is_empty()
    {
        let pattern = contains_pattern(search);
        qb.push(" AND (payload::text ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(LIKE_ESCAPE);
        qb.push(" OR COALESCE(notes, '') ILIKE ");
        qb.push_bind(pattern);
        qb.push(LIKE_ESCAPE);
        qb.push(")");
    }
    if let Some(after) = filter.submitted_after {
        qb.push(" AND submitted_at >= ");
        qb.push_bind(after);
    }
    if let Some(before) = filter.submitted_before {
        qb.push(" AND submitted_at <= ");
        qb.push_bind(before);
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: &SubmissionSort, direction: SortDirection) {
    let direction = match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    qb.push(" ORDER BY ");
    if let SubmissionSort::PayloadField(field) = sort {
        qb.push("payload ->> ");
        qb.push_bind(field.clone());
        qb.push(format!(" {direction} NULLS LAST, "));
    }
    qb.push(format!("submitted_at {direction}, id {direction}"));
}

#[async_trait]
impl SubmissionsRepo for PostgresRepositories {
    async fn create(&self, submission: &NewSubmission) -> Result<FormSubmissionRecord, RepoError> {
        let sql = format!(
            "INSERT INTO form_submissions (category, payload, submitted_at, ip, user_agent, referrer) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SUBMISSION_COLUMNS}"
        );
        let metadata = &submission.metadata;
        let row: SubmissionRow = sqlx::query_as(&sql)
            .bind(submission.category)
            .bind(Json(&submission.payload))
            .bind(metadata.submitted_at)
            .bind(metadata.ip.as_deref())
            .bind(metadata.user_agent.as_deref())
            .bind(metadata.referrer.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<FormSubmissionRecord>, RepoError> {
        let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM form_submissions WHERE id = $1");
        let row: Option<SubmissionRow> = sqlx::query_as(&sql)
            .bind(bind_id(id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(FormSubmissionRecord::from))
    }

    async fn list(
        &self,
        filter: &SubmissionFilter,
        page: PageRequest,
    ) -> Result<Paginated<FormSubmissionRecord>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM form_submissions");
        push_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb =
            QueryBuilder::new(format!("SELECT {SUBMISSION_COLUMNS} FROM form_submissions"));
        push_filter(&mut qb, filter);
        push_order(&mut qb, &filter.sort, filter.direction);
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(page.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<SubmissionRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(FormSubmissionRecord::from).collect(),
            to_u64(total),
            page,
        ))
    }

    async fn update(
        &self,
        submission: &FormSubmissionRecord,
    ) -> Result<FormSubmissionRecord, RepoError> {
        let sql = format!(
            "UPDATE form_submissions SET status = $1, processed_at = $2, processed_by = $3, \
             notes = $4 WHERE id = $5 RETURNING {SUBMISSION_COLUMNS}"
        );
        let row: Option<SubmissionRow> = sqlx::query_as(&sql)
            .bind(submission.status)
            .bind(submission.processed_at)
            .bind(opt_bind_id(submission.processed_by))
            .bind(submission.notes.as_deref())
            .bind(bind_id(submission.id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(FormSubmissionRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete(&self, id: u32) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM form_submissions WHERE id = $1")
            .bind(bind_id(id)?)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
