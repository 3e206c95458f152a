use async_trait::async_trait;

use crate::{
    application::repos::{DashboardRepo, RepoError},
    domain::entities::{ContentStats, DashboardStats, StatusCounts},
    domain::types::ContentKind,
};

use super::{PostgresRepositories, map_sqlx_error, to_u64};

#[derive(sqlx::FromRow)]
struct ContentCountsRow {
    draft: i64,
    review: i64,
    published: i64,
    deleted: i64,
    scheduled: i64,
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    submissions_pending: i64,
    submissions_total: i64,
    active_users: i64,
    categories: i64,
    authors: i64,
}

impl PostgresRepositories {
    async fn content_stats(&self, kind: ContentKind) -> Result<ContentStats, RepoError> {
        let sql = format!(
            "SELECT \
               COUNT(*) FILTER (WHERE deleted_at IS NULL AND status = 'draft') AS draft, \
               COUNT(*) FILTER (WHERE deleted_at IS NULL AND status = 'review') AS review, \
               COUNT(*) FILTER (WHERE deleted_at IS NULL AND status = 'published') AS published, \
               COUNT(*) FILTER (WHERE deleted_at IS NOT NULL) AS deleted, \
               COUNT(*) FILTER (WHERE deleted_at IS NULL AND scheduled_publish_enabled \
                                AND status <> 'published') AS scheduled \
             FROM {}",
            kind.family()
        );
        let row: ContentCountsRow = sqlx::query_as(&sql)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(ContentStats {
            kind,
            counts: StatusCounts {
                draft: to_u64(row.draft),
                review: to_u64(row.review),
                published: to_u64(row.published),
                deleted: to_u64(row.deleted),
            },
            scheduled: to_u64(row.scheduled),
        })
    }
}

#[async_trait]
impl DashboardRepo for PostgresRepositories {
    async fn dashboard_stats(&self) -> Result<DashboardStats, RepoError> {
        let mut content = Vec::with_capacity(ContentKind::ALL.len());
        for kind in ContentKind::ALL {
            content.push(self.content_stats(kind).await?);
        }

        let totals: TotalsRow = sqlx::query_as(
            "SELECT \
               (SELECT COUNT(*) FROM form_submissions WHERE status = 'pending') AS submissions_pending, \
               (SELECT COUNT(*) FROM form_submissions) AS submissions_total, \
               (SELECT COUNT(*) FROM users WHERE active) AS active_users, \
               (SELECT COUNT(*) FROM categories WHERE active) AS categories, \
               (SELECT COUNT(*) FROM authors WHERE active) AS authors",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(DashboardStats {
            content,
            submissions_pending: to_u64(totals.submissions_pending),
            submissions_total: to_u64(totals.submissions_total),
            active_users: to_u64(totals.active_users),
            categories: to_u64(totals.categories),
            authors: to_u64(totals.authors),
        })
    }
}
