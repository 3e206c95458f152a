//! The workflow engine: the single writer of publishable content.
//!
//! Every mutation loads the live row, applies the change, stamps the actor, captures a
//! report version on publish, persists, purges derived cache entries and enqueues an
//! audit record. Reads go through the stampede-safe cache.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::application::{
    attachments::AttachmentService,
    audit::AuditSink,
    context::Actor,
    error::AppError,
    pagination::{PageRequest, Paginated},
    repos::{AuditEntry, ContentFilter, ContentStore, RepoError, VersionsRepo},
};
use crate::cache::{Cache, keys};
use crate::domain::{
    content::{ContentDraft, ContentPatch, Publishable, diff_fields},
    entities::{ContentCore, ContentVersionRecord, NewContentVersion, ReportDetail, ReportRecord},
    slug::{SlugError, derive_slug, resolve_slug},
    types::ContentStatus,
    validation::Validate,
    workflow::Transition,
};

const TARGET: &str = "marketlens::workflow";
const VERSION_ATTEMPTS: u32 = 3;

fn slug_error(err: SlugError) -> AppError {
    match err {
        SlugError::EmptyInput => AppError::bad_request("Slug could not be derived from an empty title"),
        SlugError::Unrepresentable { input } => {
            AppError::bad_request(format!("Slug could not be derived from `{input}`"))
        }
    }
}

/// Publish bookkeeping shared by every path that can make a row published.
fn settle_publication(core: &mut ContentCore, now: OffsetDateTime) {
    if core.status == ContentStatus::Published {
        if core.publish_date.is_none() {
            core.publish_date = Some(now);
        }
        core.scheduled_publish_enabled = false;
    }
}

fn stamp(core: &mut ContentCore, actor: &Actor, now: OffsetDateTime) {
    core.updated_by = Some(actor.id());
    core.updated_at = now;
}

#[derive(Clone)]
pub struct WorkflowEngine<R: Publishable> {
    store: Arc<dyn ContentStore<R>>,
    versions: Arc<dyn VersionsRepo>,
    cache: Cache,
    audit: AuditSink,
    media: Option<AttachmentService>,
}

impl<R: Publishable> WorkflowEngine<R> {
    pub fn new(
        store: Arc<dyn ContentStore<R>>,
        versions: Arc<dyn VersionsRepo>,
        cache: Cache,
        audit: AuditSink,
    ) -> Self {
        Self {
            store,
            versions,
            cache,
            audit,
            media: None,
        }
    }

    /// Attach the image service whose assets are purged before a hard delete.
    pub fn with_media(mut self, media: AttachmentService) -> Self {
        self.media = Some(media);
        self
    }

    fn not_found() -> AppError {
        AppError::not_found(format!("{} not found", R::KIND.label()))
    }

    fn repo_error(err: RepoError) -> AppError {
        match err {
            RepoError::NotFound => Self::not_found(),
            RepoError::Duplicate { .. } => AppError::DuplicateSlug(format!(
                "A {} with this slug already exists",
                R::KIND.label().to_lowercase()
            )),
            other => other.into(),
        }
    }

    fn audit_entry(&self, actor: &Actor, verb: &str, id: u32) -> AuditEntry {
        AuditEntry::new(format!("{}.{verb}", R::KIND.as_str()), R::KIND.as_str())
            .actor(actor)
            .entity_id(id)
    }

    /// Load a row that is present and not soft-deleted.
    async fn load_live(&self, id: u32) -> Result<R, AppError> {
        match self.store.find_by_id(id).await.map_err(Self::repo_error)? {
            Some(record) if !record.core().is_deleted() => Ok(record),
            _ => Err(Self::not_found()),
        }
    }

    fn project(record: R, privileged: bool) -> Result<R, AppError> {
        let core = record.core();
        if core.is_deleted() || (!privileged && core.status != ContentStatus::Published) {
            return Err(Self::not_found());
        }
        let mut record = record;
        if !privileged {
            record.strip_admin_fields();
        }
        Ok(record)
    }

    pub async fn create<D: ContentDraft<R>>(&self, actor: &Actor, draft: D) -> Result<R, AppError> {
        draft.validate()?;
        let slug = resolve_slug(draft.explicit_slug(), draft.title()).map_err(slug_error)?;
        let now = OffsetDateTime::now_utc();
        let status = draft.requested_status().unwrap_or(ContentStatus::Draft);

        let core = ContentCore::new_draft(
            slug,
            draft.title().trim().to_string(),
            draft.summary().trim().to_string(),
            Some(actor.id()),
            now,
        );
        let mut record = draft.into_record(core);
        record.core_mut().status = status;
        settle_publication(record.core_mut(), now);

        let created = self.store.create(&record).await.map_err(Self::repo_error)?;
        if created.core().status == ContentStatus::Published {
            self.capture_version(&created, actor, now).await;
        }

        self.invalidate(&created, None).await;
        self.audit
            .log_async(self.audit_entry(actor, "create", created.core().id));
        info!(
            target: TARGET,
            kind = R::KIND.as_str(),
            id = created.core().id,
            slug = %created.core().slug,
            "content created"
        );
        Ok(created)
    }

    pub async fn get_by_id(&self, id: u32, privileged: bool) -> Result<R, AppError> {
        let store = self.store.clone();
        let record = self
            .cache
            .get_or_compute(
                &keys::content_by_id(R::KIND, id),
                self.cache.default_ttl(),
                move || async move { store.find_by_id(id).await?.ok_or(RepoError::NotFound) },
            )
            .await
            .map_err(Self::repo_error)?;
        Self::project(record, privileged)
    }

    pub async fn get_by_slug(&self, slug: &str, privileged: bool) -> Result<R, AppError> {
        let store = self.store.clone();
        let owned = slug.to_string();
        let record = self
            .cache
            .get_or_compute(
                &keys::content_by_slug(R::KIND, slug),
                self.cache.default_ttl(),
                move || async move {
                    store.find_by_slug(&owned).await?.ok_or(RepoError::NotFound)
                },
            )
            .await
            .map_err(Self::repo_error)?;
        Self::project(record, privileged)
    }

    /// Resolve a path segment that is either a numeric id or a slug.
    pub async fn get_by_reference(&self, reference: &str, privileged: bool) -> Result<R, AppError> {
        match reference.parse::<u32>() {
            Ok(id) => self.get_by_id(id, privileged).await,
            Err(_) => self.get_by_slug(reference, privileged).await,
        }
    }

    /// Unprivileged callers only ever see live published rows.
    pub async fn list(
        &self,
        filter: ContentFilter,
        page: PageRequest,
        privileged: bool,
    ) -> Result<Paginated<R>, AppError> {
        let filter = if privileged { filter } else { filter.public() };
        let hash = keys::hash_query(&(&filter, page));
        let key = keys::content_list(R::KIND, filter.category_slug.as_deref(), &hash);

        let store = self.store.clone();
        let result = self
            .cache
            .get_or_compute(&key, self.cache.default_ttl(), move || async move {
                store.list(&filter, page).await
            })
            .await
            .map_err(Self::repo_error)?;

        Ok(if privileged {
            result
        } else {
            result.map(|mut record| {
                record.strip_admin_fields();
                record
            })
        })
    }

    pub async fn update<P: ContentPatch<R>>(
        &self,
        actor: &Actor,
        id: u32,
        patch: P,
    ) -> Result<R, AppError> {
        patch.validate()?;
        let before = self.load_live(id).await?;
        let slug = patch
            .slug()
            .map(derive_slug)
            .transpose()
            .map_err(slug_error)?;
        let status = patch.status();

        let mut after = before.clone();
        patch.apply_to(&mut after);
        let now = OffsetDateTime::now_utc();
        {
            let core = after.core_mut();
            if let Some(slug) = slug {
                core.slug = slug;
            }
            if let Some(status) = status {
                core.status = status;
            }
            stamp(core, actor, now);
            settle_publication(core, now);
        }

        let saved = self.store.update(&after).await.map_err(Self::repo_error)?;
        if before.core().status != ContentStatus::Published
            && saved.core().status == ContentStatus::Published
        {
            self.capture_version(&saved, actor, now).await;
        }

        self.invalidate(&saved, Some(&before.core().slug)).await;
        self.audit.log_async(
            self.audit_entry(actor, "update", id)
                .changes(diff_fields(&before, &saved)),
        );
        Ok(saved)
    }

    /// Apply a named transition validated against the state machine.
    pub async fn transition(
        &self,
        actor: &Actor,
        id: u32,
        transition: Transition,
    ) -> Result<R, AppError> {
        let before = self.load_live(id).await?;
        let target = transition.apply(before.core().status)?;

        let mut after = before.clone();
        let now = OffsetDateTime::now_utc();
        {
            let core = after.core_mut();
            core.status = target;
            stamp(core, actor, now);
            settle_publication(core, now);
        }

        let saved = self.store.update(&after).await.map_err(Self::repo_error)?;
        if transition == Transition::Approve {
            self.capture_version(&saved, actor, now).await;
        }

        self.invalidate(&saved, None).await;
        self.audit.log_async(
            self.audit_entry(actor, transition.audit_verb(), id)
                .changes(diff_fields(&before, &saved)),
        );
        debug!(
            target: TARGET,
            kind = R::KIND.as_str(),
            id,
            action = transition.action(),
            status = %saved.core().status,
            "transition applied"
        );
        Ok(saved)
    }

    pub async fn submit_for_review(&self, actor: &Actor, id: u32) -> Result<R, AppError> {
        self.transition(actor, id, Transition::SubmitForReview).await
    }

    pub async fn approve(&self, actor: &Actor, id: u32) -> Result<R, AppError> {
        self.transition(actor, id, Transition::Approve).await
    }

    pub async fn reject(&self, actor: &Actor, id: u32) -> Result<R, AppError> {
        self.transition(actor, id, Transition::Reject).await
    }

    pub async fn unpublish(&self, actor: &Actor, id: u32) -> Result<R, AppError> {
        self.transition(actor, id, Transition::Unpublish).await
    }

    /// Arm scheduled publication at `at`; the status itself is unchanged.
    pub async fn schedule(
        &self,
        actor: &Actor,
        id: u32,
        at: OffsetDateTime,
    ) -> Result<R, AppError> {
        let before = self.load_live(id).await?;
        Transition::Schedule.apply(before.core().status)?;

        let mut after = before.clone();
        {
            let core = after.core_mut();
            core.publish_date = Some(at);
            core.scheduled_publish_enabled = true;
            stamp(core, actor, OffsetDateTime::now_utc());
        }
        self.save_tracked(actor, "schedule", before, after).await
    }

    pub async fn cancel_schedule(&self, actor: &Actor, id: u32) -> Result<R, AppError> {
        let before = self.load_live(id).await?;
        let mut after = before.clone();
        {
            let core = after.core_mut();
            core.scheduled_publish_enabled = false;
            stamp(core, actor, OffsetDateTime::now_utc());
        }
        self.save_tracked(actor, "cancel_schedule", before, after).await
    }

    async fn save_tracked(&self, actor: &Actor, verb: &str, before: R, after: R) -> Result<R, AppError> {
        let saved = self.store.update(&after).await.map_err(Self::repo_error)?;
        self.invalidate(&saved, None).await;
        self.audit.log_async(
            self.audit_entry(actor, verb, saved.core().id)
                .changes(diff_fields(&before, &saved)),
        );
        Ok(saved)
    }

    pub async fn soft_delete(&self, actor: &Actor, id: u32) -> Result<(), AppError> {
        let record = self.load_live(id).await?;
        self.store
            .soft_delete(id, OffsetDateTime::now_utc(), Some(actor.id()))
            .await
            .map_err(Self::repo_error)?;
        self.invalidate(&record, None).await;
        self.audit.log_async(self.audit_entry(actor, "soft_delete", id));
        Ok(())
    }

    /// Bring a tombstoned row back with its status untouched.
    pub async fn restore(&self, actor: &Actor, id: u32) -> Result<R, AppError> {
        let Some(record) = self.store.find_by_id(id).await.map_err(Self::repo_error)? else {
            return Err(Self::not_found());
        };
        if !record.core().is_deleted() {
            return Err(AppError::bad_request(format!(
                "{} is not deleted",
                R::KIND.label()
            )));
        }

        self.store
            .restore(id, OffsetDateTime::now_utc(), Some(actor.id()))
            .await
            .map_err(Self::repo_error)?;
        let restored = self.load_live(id).await?;
        self.invalidate(&restored, None).await;
        self.audit.log_async(self.audit_entry(actor, "restore", id));
        Ok(restored)
    }

    /// Remove the row for good. Attached CDN assets are purged first, best-effort.
    pub async fn delete(&self, actor: &Actor, id: u32) -> Result<(), AppError> {
        let Some(record) = self.store.find_by_id(id).await.map_err(Self::repo_error)? else {
            return Err(Self::not_found());
        };
        if let Some(media) = &self.media {
            media.purge_for_report(id).await;
        }
        self.store.delete(id).await.map_err(Self::repo_error)?;
        self.invalidate(&record, None).await;
        self.audit.log_async(self.audit_entry(actor, "delete", id));
        Ok(())
    }

    /// Append version `max + 1`. Losing a race on the unique index retries; any
    /// remaining failure is logged and the publish stands.
    async fn capture_version(&self, record: &R, actor: &Actor, now: OffsetDateTime) {
        let Some(snapshot) = record.version_snapshot() else {
            return;
        };
        let report_id = record.core().id;

        for attempt in 1..=VERSION_ATTEMPTS {
            let next = match self.versions.max_version(report_id).await {
                Ok(max) => max + 1,
                Err(err) => {
                    error!(target: TARGET, report_id, error = %err, "failed to read version history");
                    return;
                }
            };
            let version = NewContentVersion {
                report_id,
                version_number: next,
                published_by: Some(actor.id()),
                published_at: now,
                snapshot: snapshot.clone(),
            };
            match self.versions.insert_version(&version).await {
                Ok(saved) => {
                    info!(target: TARGET, report_id, version = saved.version_number, "version captured");
                    return;
                }
                Err(err) if err.is_duplicate() && attempt < VERSION_ATTEMPTS => {
                    warn!(target: TARGET, report_id, version = next, attempt, "version number taken; retrying");
                }
                Err(err) => {
                    error!(target: TARGET, report_id, version = next, error = %err, "failed to capture version");
                    return;
                }
            }
        }
    }

    /// Purge list and category entries of the family plus the row's own keys.
    async fn invalidate(&self, record: &R, previous_slug: Option<&str>) {
        for pattern in keys::family_patterns(R::KIND) {
            self.cache.delete_by_prefix(&pattern).await;
        }
        let core = record.core();
        self.cache.delete(&keys::content_by_id(R::KIND, core.id)).await;
        self.cache
            .delete(&keys::content_by_slug(R::KIND, &core.slug))
            .await;
        if let Some(previous) = previous_slug
            && previous != core.slug
        {
            self.cache
                .delete(&keys::content_by_slug(R::KIND, previous))
                .await;
        }
    }
}

impl WorkflowEngine<ReportRecord> {
    /// Version history of a visible report, oldest first.
    pub async fn versions(
        &self,
        id: u32,
        privileged: bool,
    ) -> Result<Vec<ContentVersionRecord>, AppError> {
        self.get_by_id(id, privileged).await?;
        Ok(self.versions.list_versions(id).await?)
    }

    /// Detail read model: the report plus versions and active images.
    pub async fn detail(&self, report: ReportRecord) -> Result<ReportDetail, AppError> {
        let versions = self.versions.list_versions(report.core.id).await?;
        let images = match &self.media {
            Some(media) => media.list(report.core.id, false).await?,
            None => Vec::new(),
        };
        Ok(ReportDetail {
            report,
            versions,
            images,
        })
    }
}
