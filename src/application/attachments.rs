//! Report image attachments stored on an external image CDN.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::{
    audit::AuditSink,
    context::Actor,
    error::AppError,
    repos::{AttachmentsRepo, AuditEntry, ContentStore, NewAttachment},
};
use crate::domain::entities::{ImageAttachmentRecord, ReportRecord};

const TARGET: &str = "marketlens::attachments";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CdnError {
    #[error("image CDN is not configured")]
    NotConfigured,
    #[error("image CDN request failed: {0}")]
    Request(String),
    #[error("image CDN rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Metadata sent with every upload so assets can be traced back to their owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub report_id: u32,
    pub kind: &'static str,
    pub uploaded_by: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnImage {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait ImageCdn: Send + Sync {
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        metadata: &ImageMetadata,
    ) -> Result<CdnImage, CdnError>;

    async fn delete(&self, image_id: &str) -> Result<(), CdnError>;
}

/// A file received from the multipart `image` part.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: Option<String>,
    pub title: Option<String>,
}

impl ImageUpload {
    /// Declared content type first, then a guess from the filename.
    pub fn is_image(&self) -> bool {
        match self.content_type.as_deref() {
            Some(declared) if !declared.is_empty() && declared != "application/octet-stream" => {
                declared.starts_with("image/")
            }
            _ => mime_guess::from_path(&self.filename)
                .first()
                .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE),
        }
    }
}

#[derive(Clone)]
pub struct AttachmentService {
    reports: Arc<dyn ContentStore<ReportRecord>>,
    repo: Arc<dyn AttachmentsRepo>,
    cdn: Arc<dyn ImageCdn>,
    audit: AuditSink,
}

impl AttachmentService {
    pub fn new(
        reports: Arc<dyn ContentStore<ReportRecord>>,
        repo: Arc<dyn AttachmentsRepo>,
        cdn: Arc<dyn ImageCdn>,
        audit: AuditSink,
    ) -> Self {
        Self {
            reports,
            repo,
            cdn,
            audit,
        }
    }

    pub async fn upload(
        &self,
        actor: &Actor,
        report_id: u32,
        upload: ImageUpload,
    ) -> Result<ImageAttachmentRecord, AppError> {
        if upload.bytes.is_empty() {
            return Err(AppError::bad_request("Image file is required"));
        }
        if !upload.is_image() {
            return Err(AppError::bad_request("Only image uploads are accepted"));
        }

        match self.reports.find_by_id(report_id).await? {
            Some(report) if !report.core.is_deleted() => {}
            _ => return Err(AppError::not_found("Report not found")),
        }

        let metadata = ImageMetadata {
            report_id,
            kind: "report",
            uploaded_by: actor.id(),
        };
        let image = self
            .cdn
            .upload(upload.bytes, &upload.filename, &metadata)
            .await
            .map_err(|err| match err {
                CdnError::NotConfigured => AppError::upstream(err.to_string()),
                other => AppError::storage(other.to_string()),
            })?;

        let title = upload
            .title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty());
        let inserted = self
            .repo
            .insert(&NewAttachment {
                report_id,
                cdn_image_id: image.id.clone(),
                url: image.url.clone(),
                title,
                uploaded_by: Some(actor.id()),
            })
            .await;

        let record = match inserted {
            Ok(record) => record,
            Err(err) => {
                if let Err(cleanup) = self.cdn.delete(&image.id).await {
                    warn!(
                        target: TARGET,
                        image_id = %image.id,
                        error = %cleanup,
                        "failed to remove orphaned CDN image"
                    );
                }
                return Err(AppError::storage(err.to_string()));
            }
        };

        info!(target: TARGET, report_id, image_id = %record.cdn_image_id, "image attached");
        self.audit.log_async(
            AuditEntry::new("report.image_upload", "image_attachment")
                .actor(actor)
                .entity_id(record.id),
        );
        Ok(record)
    }

    pub async fn list(
        &self,
        report_id: u32,
        include_inactive: bool,
    ) -> Result<Vec<ImageAttachmentRecord>, AppError> {
        Ok(self
            .repo
            .list_for_report(report_id, include_inactive)
            .await?)
    }

    /// Hide an image. The CDN asset is kept so the image can be restored.
    pub async fn soft_delete(
        &self,
        actor: &Actor,
        report_id: u32,
        image_id: u32,
    ) -> Result<ImageAttachmentRecord, AppError> {
        self.set_active(actor, report_id, image_id, false).await
    }

    pub async fn restore(
        &self,
        actor: &Actor,
        report_id: u32,
        image_id: u32,
    ) -> Result<ImageAttachmentRecord, AppError> {
        self.set_active(actor, report_id, image_id, true).await
    }

    async fn set_active(
        &self,
        actor: &Actor,
        report_id: u32,
        image_id: u32,
        active: bool,
    ) -> Result<ImageAttachmentRecord, AppError> {
        match self.repo.find_by_id(image_id).await? {
            Some(existing) if existing.report_id == report_id => {}
            _ => return Err(AppError::not_found("Image not found")),
        }

        let updated = self
            .repo
            .set_active(image_id, active, OffsetDateTime::now_utc())
            .await?;
        let verb = if active { "restore" } else { "soft_delete" };
        self.audit.log_async(
            AuditEntry::new(format!("report.image_{verb}"), "image_attachment")
                .actor(actor)
                .entity_id(image_id),
        );
        Ok(updated)
    }

    /// Remove every CDN asset of a report ahead of its deletion. Failures are logged.
    pub async fn purge_for_report(&self, report_id: u32) {
        let attachments = match self.repo.list_for_report(report_id, true).await {
            Ok(attachments) => attachments,
            Err(err) => {
                warn!(target: TARGET, report_id, error = %err, "failed to enumerate attachments for purge");
                return;
            }
        };

        for attachment in attachments {
            if let Err(err) = self.cdn.delete(&attachment.cdn_image_id).await {
                warn!(
                    target: TARGET,
                    report_id,
                    image_id = %attachment.cdn_image_id,
                    error = %err,
                    "failed to purge CDN image"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: &str, content_type: Option<&str>) -> ImageUpload {
        ImageUpload {
            bytes: Bytes::from_static(b"\x89PNG"),
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            title: None,
        }
    }

    #[test]
    fn image_detection_prefers_declared_type() {
        assert!(upload("chart.bin", Some("image/png")).is_image());
        assert!(!upload("chart.png", Some("text/plain")).is_image());
        assert!(upload("chart.png", None).is_image());
        assert!(upload("chart.webp", Some("application/octet-stream")).is_image());
        assert!(!upload("notes.pdf", None).is_image());
    }
}
