//! Public form submissions and their administration.

use std::sync::Arc;

use marketlens_api_types::{SubmissionCreateRequest, SubmissionUpdateRequest};
use time::OffsetDateTime;
use tracing::info;

use crate::application::{
    audit::AuditSink,
    context::{Actor, RequestMeta},
    error::AppError,
    pagination::{PageRequest, Paginated},
    repos::{
        AuditEntry, NewSubmission, SubmissionFilter, SubmissionSort, SubmissionsRepo,
    },
};
use crate::domain::{
    content::diff_fields,
    entities::{FormSubmissionRecord, SubmissionMetadata},
    submissions::{SORTABLE_PAYLOAD_FIELDS, validate_payload},
    types::SubmissionStatus,
};

const TARGET: &str = "marketlens::submissions";

/// Map a `sort` query value onto a submission ordering; unknown fields are rejected.
pub fn parse_sort(value: Option<&str>) -> Result<SubmissionSort, AppError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        None | Some("submitted_at") | Some("created_at") => Ok(SubmissionSort::SubmittedAt),
        Some(field) if SORTABLE_PAYLOAD_FIELDS.contains(&field) => {
            Ok(SubmissionSort::PayloadField(field.to_string()))
        }
        Some(field) => Err(AppError::bad_request(format!(
            "Cannot sort submissions by `{field}`"
        ))),
    }
}

#[derive(Clone)]
pub struct SubmissionService {
    repo: Arc<dyn SubmissionsRepo>,
    audit: AuditSink,
}

impl SubmissionService {
    pub fn new(repo: Arc<dyn SubmissionsRepo>, audit: AuditSink) -> Self {
        Self { repo, audit }
    }

    /// Accept a public submission; the payload is validated per category.
    pub async fn submit(
        &self,
        request: SubmissionCreateRequest,
        meta: &RequestMeta,
    ) -> Result<FormSubmissionRecord, AppError> {
        let payload = validate_payload(request.category, &request.payload)?;
        let created = self
            .repo
            .create(&NewSubmission {
                category: request.category,
                payload,
                metadata: SubmissionMetadata {
                    submitted_at: OffsetDateTime::now_utc(),
                    ip: meta.ip.clone(),
                    user_agent: meta.user_agent.clone(),
                    referrer: request
                        .referrer
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty()),
                },
            })
            .await?;

        info!(target: TARGET, id = created.id, category = %created.category, "submission received");
        self.audit.log_async(
            AuditEntry::new("submission.create", "form_submission")
                .request(meta)
                .entity_id(created.id),
        );
        Ok(created)
    }

    pub async fn list(
        &self,
        filter: &SubmissionFilter,
        page: PageRequest,
    ) -> Result<Paginated<FormSubmissionRecord>, AppError> {
        Ok(self.repo.list(filter, page).await?)
    }

    pub async fn get(&self, id: u32) -> Result<FormSubmissionRecord, AppError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Submission not found"))
    }

    /// Move a submission through pending → processed/archived and attach notes.
    pub async fn update(
        &self,
        actor: &Actor,
        id: u32,
        request: SubmissionUpdateRequest,
    ) -> Result<FormSubmissionRecord, AppError> {
        let before = self.get(id).await?;
        let mut after = before.clone();

        if let Some(status) = request.status
            && status != before.status
        {
            after.status = status;
            if status == SubmissionStatus::Pending {
                after.processed_at = None;
                after.processed_by = None;
            } else {
                after.processed_at = Some(OffsetDateTime::now_utc());
                after.processed_by = Some(actor.id());
            }
        }
        if let Some(notes) = request.notes {
            let notes = notes.trim().to_string();
            after.notes = (!notes.is_empty()).then_some(notes);
        }

        let saved = self.repo.update(&after).await?;
        self.audit.log_async(
            AuditEntry::new("submission.update", "form_submission")
                .actor(actor)
                .entity_id(id)
                .changes(diff_fields(&before, &saved)),
        );
        Ok(saved)
    }

    pub async fn delete(&self, actor: &Actor, id: u32) -> Result<(), AppError> {
        self.get(id).await?;
        self.repo.delete(id).await?;
        self.audit.log_async(
            AuditEntry::new("submission.delete", "form_submission")
                .actor(actor)
                .entity_id(id),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_accepts_whitelisted_payload_fields() {
        assert_eq!(parse_sort(None).expect("default"), SubmissionSort::SubmittedAt);
        assert_eq!(
            parse_sort(Some("company")).expect("company"),
            SubmissionSort::PayloadField("company".to_string())
        );
        assert!(matches!(
            parse_sort(Some("password")),
            Err(AppError::BadRequest(_))
        ));
    }
}
