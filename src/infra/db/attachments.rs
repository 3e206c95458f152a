use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{AttachmentsRepo, NewAttachment, RepoError},
    domain::entities::ImageAttachmentRecord,
};

use super::{PostgresRepositories, bind_id, map_sqlx_error, opt_bind_id, opt_row_id, row_id};

const ATTACHMENT_COLUMNS: &str =
    "id, report_id, cdn_image_id, url, title, active, uploaded_by, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: i32,
    report_id: i32,
    cdn_image_id: String,
    url: String,
    title: Option<String>,
    active: bool,
    uploaded_by: Option<i32>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<AttachmentRow> for ImageAttachmentRecord {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: row_id(row.id),
            report_id: row_id(row.report_id),
            cdn_image_id: row.cdn_image_id,
            url: row.url,
            title: row.title,
            active: row.active,
            uploaded_by: opt_row_id(row.uploaded_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl AttachmentsRepo for PostgresRepositories {
    async fn insert(
        &self,
        attachment: &NewAttachment,
    ) -> Result<ImageAttachmentRecord, RepoError> {
        let sql = format!(
            "INSERT INTO report_images (report_id, cdn_image_id, url, title, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ATTACHMENT_COLUMNS}"
        );
        let row: AttachmentRow = sqlx::query_as(&sql)
            .bind(bind_id(attachment.report_id)?)
            .bind(attachment.cdn_image_id.as_str())
            .bind(attachment.url.as_str())
            .bind(attachment.title.as_deref())
            .bind(opt_bind_id(attachment.uploaded_by))
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<ImageAttachmentRecord>, RepoError> {
        let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM report_images WHERE id = $1");
        let row: Option<AttachmentRow> = sqlx::query_as(&sql)
            .bind(bind_id(id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ImageAttachmentRecord::from))
    }

    async fn list_for_report(
        &self,
        report_id: u32,
        include_inactive: bool,
    ) -> Result<Vec<ImageAttachmentRecord>, RepoError> {
        let sql = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM report_images \
             WHERE report_id = $1 AND (active OR $2) ORDER BY created_at ASC, id ASC"
        );
        let rows: Vec<AttachmentRow> = sqlx::query_as(&sql)
            .bind(bind_id(report_id)?)
            .bind(include_inactive)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ImageAttachmentRecord::from).collect())
    }

    async fn set_active(
        &self,
        id: u32,
        active: bool,
        at: OffsetDateTime,
    ) -> Result<ImageAttachmentRecord, RepoError> {
        let sql = format!(
            "UPDATE report_images SET active = $1, updated_at = $2 WHERE id = $3 \
             RETURNING {ATTACHMENT_COLUMNS}"
        );
        let row: Option<AttachmentRow> = sqlx::query_as(&sql)
            .bind(active)
            .bind(at)
            .bind(bind_id(id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(ImageAttachmentRecord::from).ok_or(RepoError::NotFound)
    }
}
