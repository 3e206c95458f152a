#![allow(dead_code)]

//! In-memory backends and request helpers shared by the HTTP integration tests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;

use marketlens::application::attachments::{CdnError, CdnImage, ImageCdn, ImageMetadata};
use marketlens::application::audit::{AuditSink, AuditWorker};
use marketlens::application::auth::{HashCost, PasswordHasher, TokenLifetimes};
use marketlens::application::guards::RatePolicy;
use marketlens::application::pagination::{PageRequest, Paginated};
use marketlens::application::repos::{
    AttachmentsRepo, AuditEntry, AuditFilter, AuditRepo, AuthorsRepo, CategoriesRepo,
    ContentFilter, ContentStore, DashboardRepo, HealthProbe, NewAttachment, NewAuthor,
    NewCategory, NewPrincipal, NewSubmission, PrincipalFilter, PrincipalsRepo, Promoted,
    RepoError, ScheduleRepo, SortDirection, SubmissionFilter, SubmissionSort, SubmissionsRepo,
    VersionsRepo,
};
use marketlens::cache::{Cache, CacheConfig, MemoryStore};
use marketlens::config::CsrfSettings;
use marketlens::domain::content::Publishable;
use marketlens::domain::entities::{
    AuditRecord, AuthorRecord, BlogRecord, CategoryRecord, ContentStats, ContentVersionRecord,
    DashboardStats, FormSubmissionRecord, ImageAttachmentRecord, NewContentVersion,
    PressReleaseRecord, PrincipalRecord, ReportRecord, StatusCounts,
};
use marketlens::domain::types::{ContentKind, ContentStatus, Role, SubmissionStatus};
use marketlens::infra::http::{ApiState, Backends, SecurityConfig, build_router};

pub const TEST_SECRET: &[u8] = b"integration-test-secret-of-sufficient-length";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const EDITOR_EMAIL: &str = "editor@example.com";
pub const VIEWER_EMAIL: &str = "viewer@example.com";
pub const PASSWORD: &str = "Admin@123";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "X-CSRF-Token";
pub const TRUSTED_PROXY: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 443);

/// Every persistence port backed by vectors behind async mutexes.
#[derive(Default)]
pub struct MemoryBackend {
    pub reports: Mutex<Vec<ReportRecord>>,
    pub blogs: Mutex<Vec<BlogRecord>>,
    pub press_releases: Mutex<Vec<PressReleaseRecord>>,
    pub versions: Mutex<Vec<ContentVersionRecord>>,
    pub principals: Mutex<Vec<PrincipalRecord>>,
    pub categories: Mutex<Vec<CategoryRecord>>,
    pub authors: Mutex<Vec<AuthorRecord>>,
    pub submissions: Mutex<Vec<FormSubmissionRecord>>,
    pub attachments: Mutex<Vec<ImageAttachmentRecord>>,
    pub audit: Mutex<Vec<AuditRecord>>,
    pub content_finds: AtomicU32,
    pub database_down: AtomicBool,
    sequence: AtomicU32,
}

impl MemoryBackend {
    fn next_id(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn audit_actions(&self) -> Vec<String> {
        self.audit
            .lock()
            .await
            .iter()
            .map(|record| record.action.clone())
            .collect()
    }
}

fn page_of<T: Clone>(rows: Vec<T>, page: PageRequest) -> Paginated<T> {
    let total = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Paginated::new(items, total, page)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Selects the table holding one content kind.
pub trait ContentTable<R> {
    fn table(&self) -> &Mutex<Vec<R>>;
}

impl ContentTable<ReportRecord> for MemoryBackend {
    fn table(&self) -> &Mutex<Vec<ReportRecord>> {
        &self.reports
    }
}

impl ContentTable<BlogRecord> for MemoryBackend {
    fn table(&self) -> &Mutex<Vec<BlogRecord>> {
        &self.blogs
    }
}

impl ContentTable<PressReleaseRecord> for MemoryBackend {
    fn table(&self) -> &Mutex<Vec<PressReleaseRecord>> {
        &self.press_releases
    }
}

fn matches_filter<R: Publishable>(
    record: &R,
    filter: &ContentFilter,
    category_id: Option<Option<u32>>,
) -> bool {
    let core = record.core();
    if !filter.show_deleted && core.is_deleted() {
        return false;
    }
    if filter.status.is_some_and(|status| status != core.status) {
        return false;
    }
    if let Some(expected) = category_id
        && expected.is_none_or(|id| core.category_id != Some(id))
    {
        return false;
    }
    if !filter.geography.is_empty()
        && !record
            .geography()
            .iter()
            .any(|region| filter.geography.contains(region))
    {
        return false;
    }
    if let Some(search) = filter.search.as_deref()
        && !record
            .search_text()
            .iter()
            .any(|text| contains_ci(text, search))
    {
        return false;
    }
    if filter
        .author_id
        .is_some_and(|author| !record.is_authored_by(author))
    {
        return false;
    }
    if filter.created_by.is_some() && filter.created_by != core.created_by {
        return false;
    }
    if filter.updated_by.is_some() && filter.updated_by != core.updated_by {
        return false;
    }
    let within = |value: Option<OffsetDateTime>,
                  after: Option<OffsetDateTime>,
                  before: Option<OffsetDateTime>| {
        match (after, before) {
            (None, None) => true,
            _ => value.is_some_and(|value| {
                after.is_none_or(|after| value >= after) && before.is_none_or(|before| value <= before)
            }),
        }
    };
    within(Some(core.created_at), filter.created_after, filter.created_before)
        && within(Some(core.updated_at), filter.updated_after, filter.updated_before)
        && within(core.publish_date, filter.published_after, filter.published_before)
}

#[async_trait]
impl<R: Publishable> ContentStore<R> for MemoryBackend
where
    MemoryBackend: ContentTable<R>,
{
    async fn create(&self, record: &R) -> Result<R, RepoError> {
        let mut rows = ContentTable::<R>::table(self).lock().await;
        if rows
            .iter()
            .any(|row| row.core().slug == record.core().slug && !row.core().is_deleted())
        {
            return Err(RepoError::Duplicate {
                constraint: format!("{}_slug_key", R::KIND.family()),
            });
        }
        let mut created = record.clone();
        created.core_mut().id = self.next_id();
        rows.push(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<R>, RepoError> {
        self.content_finds.fetch_add(1, Ordering::SeqCst);
        let rows = ContentTable::<R>::table(self).lock().await;
        Ok(rows.iter().find(|row| row.core().id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<R>, RepoError> {
        self.content_finds.fetch_add(1, Ordering::SeqCst);
        let rows = ContentTable::<R>::table(self).lock().await;
        let live = rows
            .iter()
            .find(|row| row.core().slug == slug && !row.core().is_deleted());
        Ok(live
            .or_else(|| rows.iter().find(|row| row.core().slug == slug))
            .cloned())
    }

    async fn update(&self, record: &R) -> Result<R, RepoError> {
        let mut rows = ContentTable::<R>::table(self).lock().await;
        let id = record.core().id;
        if rows.iter().any(|row| {
            row.core().id != id && row.core().slug == record.core().slug && !row.core().is_deleted()
        }) {
            return Err(RepoError::Duplicate {
                constraint: format!("{}_slug_key", R::KIND.family()),
            });
        }
        let row = rows
            .iter_mut()
            .find(|row| row.core().id == id)
            .ok_or(RepoError::NotFound)?;
        *row = record.clone();
        Ok(record.clone())
    }

    async fn soft_delete(
        &self,
        id: u32,
        at: OffsetDateTime,
        actor: Option<u32>,
    ) -> Result<(), RepoError> {
        let mut rows = ContentTable::<R>::table(self).lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.core().id == id)
            .ok_or(RepoError::NotFound)?;
        let core = row.core_mut();
        core.deleted_at = Some(at);
        core.updated_at = at;
        core.updated_by = actor;
        Ok(())
    }

    async fn restore(
        &self,
        id: u32,
        at: OffsetDateTime,
        actor: Option<u32>,
    ) -> Result<(), RepoError> {
        let mut rows = ContentTable::<R>::table(self).lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.core().id == id)
            .ok_or(RepoError::NotFound)?;
        let core = row.core_mut();
        core.deleted_at = None;
        core.updated_at = at;
        core.updated_by = actor;
        Ok(())
    }

    async fn delete(&self, id: u32) -> Result<(), RepoError> {
        let mut rows = ContentTable::<R>::table(self).lock().await;
        let before = rows.len();
        rows.retain(|row| row.core().id != id);
        if rows.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &ContentFilter,
        page: PageRequest,
    ) -> Result<Paginated<R>, RepoError> {
        let category_id = match filter.category_slug.as_deref() {
            Some(slug) => Some(
                self.categories
                    .lock()
                    .await
                    .iter()
                    .find(|category| category.slug == slug)
                    .map(|category| category.id),
            ),
            None => None,
        };
        let mut rows: Vec<R> = self
            .table()
            .lock()
            .await
            .iter()
            .filter(|row| matches_filter(*row, filter, category_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.core()
                .created_at
                .cmp(&a.core().created_at)
                .then(b.core().id.cmp(&a.core().id))
        });
        Ok(page_of(rows, page))
    }
}

async fn promote<R: Publishable>(
    rows: &Mutex<Vec<R>>,
    now: OffsetDateTime,
) -> Vec<Promoted> {
    let mut rows = rows.lock().await;
    let mut promoted = Vec::new();
    for row in rows.iter_mut() {
        let core = row.core_mut();
        let due = core.publish_date.is_some_and(|at| at <= now);
        if core.scheduled_publish_enabled
            && core.status != ContentStatus::Published
            && core.deleted_at.is_none()
            && due
        {
            core.status = ContentStatus::Published;
            core.scheduled_publish_enabled = false;
            core.updated_at = now;
            promoted.push(Promoted {
                id: core.id,
                slug: core.slug.clone(),
            });
        }
    }
    promoted
}

#[async_trait]
impl ScheduleRepo for MemoryBackend {
    async fn publish_due(
        &self,
        kind: ContentKind,
        now: OffsetDateTime,
    ) -> Result<Vec<Promoted>, RepoError> {
        Ok(match kind {
            ContentKind::Report => promote(&self.reports, now).await,
            ContentKind::Blog => promote(&self.blogs, now).await,
            ContentKind::PressRelease => promote(&self.press_releases, now).await,
        })
    }
}

#[async_trait]
impl VersionsRepo for MemoryBackend {
    async fn max_version(&self, report_id: u32) -> Result<u32, RepoError> {
        Ok(self
            .versions
            .lock()
            .await
            .iter()
            .filter(|version| version.report_id == report_id)
            .map(|version| version.version_number)
            .max()
            .unwrap_or(0))
    }

    async fn insert_version(
        &self,
        version: &NewContentVersion,
    ) -> Result<ContentVersionRecord, RepoError> {
        let mut versions = self.versions.lock().await;
        if versions.iter().any(|existing| {
            existing.report_id == version.report_id
                && existing.version_number == version.version_number
        }) {
            return Err(RepoError::Duplicate {
                constraint: "content_versions_report_version_key".to_string(),
            });
        }
        let record = ContentVersionRecord {
            id: self.next_id(),
            report_id: version.report_id,
            version_number: version.version_number,
            published_by: version.published_by,
            published_at: version.published_at,
            sections: version.snapshot.sections.clone(),
            seo: version.snapshot.seo.clone(),
        };
        versions.push(record.clone());
        Ok(record)
    }

    async fn list_versions(&self, report_id: u32) -> Result<Vec<ContentVersionRecord>, RepoError> {
        let mut versions: Vec<_> = self
            .versions
            .lock()
            .await
            .iter()
            .filter(|version| version.report_id == report_id)
            .cloned()
            .collect();
        versions.sort_by_key(|version| version.version_number);
        Ok(versions)
    }
}

#[async_trait]
impl PrincipalsRepo for MemoryBackend {
    async fn find_by_id(&self, id: u32) -> Result<Option<PrincipalRecord>, RepoError> {
        Ok(self
            .principals
            .lock()
            .await
            .iter()
            .find(|principal| principal.id == id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>, RepoError> {
        Ok(self
            .principals
            .lock()
            .await
            .iter()
            .find(|principal| principal.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list(
        &self,
        filter: &PrincipalFilter,
        page: PageRequest,
    ) -> Result<Paginated<PrincipalRecord>, RepoError> {
        let rows = self
            .principals
            .lock()
            .await
            .iter()
            .filter(|principal| filter.role.is_none_or(|role| principal.role == role))
            .filter(|principal| filter.active.is_none_or(|active| principal.active == active))
            .filter(|principal| {
                filter.search.as_deref().is_none_or(|search| {
                    contains_ci(&principal.email, search) || contains_ci(&principal.name, search)
                })
            })
            .cloned()
            .collect();
        Ok(page_of(rows, page))
    }

    async fn create(&self, principal: &NewPrincipal) -> Result<PrincipalRecord, RepoError> {
        let mut principals = self.principals.lock().await;
        if principals
            .iter()
            .any(|existing| existing.email.eq_ignore_ascii_case(&principal.email))
        {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".to_string(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = PrincipalRecord {
            id: self.next_id(),
            email: principal.email.clone(),
            password_hash: principal.password_hash.clone(),
            name: principal.name.clone(),
            role: principal.role,
            active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        principals.push(record.clone());
        Ok(record)
    }

    async fn update(&self, principal: &PrincipalRecord) -> Result<PrincipalRecord, RepoError> {
        let mut principals = self.principals.lock().await;
        if principals.iter().any(|existing| {
            existing.id != principal.id && existing.email.eq_ignore_ascii_case(&principal.email)
        }) {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".to_string(),
            });
        }
        let row = principals
            .iter_mut()
            .find(|existing| existing.id == principal.id)
            .ok_or(RepoError::NotFound)?;
        *row = principal.clone();
        Ok(principal.clone())
    }

    async fn record_login(&self, id: u32, at: OffsetDateTime) -> Result<(), RepoError> {
        if let Some(principal) = self
            .principals
            .lock()
            .await
            .iter_mut()
            .find(|principal| principal.id == id)
        {
            principal.last_login_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl CategoriesRepo for MemoryBackend {
    async fn list(&self, include_inactive: bool) -> Result<Vec<CategoryRecord>, RepoError> {
        let mut rows: Vec<_> = self
            .categories
            .lock()
            .await
            .iter()
            .filter(|category| include_inactive || category.active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(rows)
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<CategoryRecord>, RepoError> {
        Ok(self
            .categories
            .lock()
            .await
            .iter()
            .find(|category| category.id == id)
            .cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CategoryRecord>, RepoError> {
        Ok(self
            .categories
            .lock()
            .await
            .iter()
            .find(|category| category.slug == slug)
            .cloned())
    }

    async fn create(&self, category: &NewCategory) -> Result<CategoryRecord, RepoError> {
        let mut categories = self.categories.lock().await;
        if categories.iter().any(|existing| existing.slug == category.slug) {
            return Err(RepoError::Duplicate {
                constraint: "categories_slug_key".to_string(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = CategoryRecord {
            id: self.next_id(),
            slug: category.slug.clone(),
            name: category.name.clone(),
            description: category.description.clone(),
            sort_order: category.sort_order,
            active: category.active,
            created_at: now,
            updated_at: now,
        };
        categories.push(record.clone());
        Ok(record)
    }

    async fn update(&self, category: &CategoryRecord) -> Result<CategoryRecord, RepoError> {
        let mut categories = self.categories.lock().await;
        let row = categories
            .iter_mut()
            .find(|existing| existing.id == category.id)
            .ok_or(RepoError::NotFound)?;
        *row = category.clone();
        Ok(category.clone())
    }

    async fn delete(&self, id: u32) -> Result<(), RepoError> {
        let mut categories = self.categories.lock().await;
        let before = categories.len();
        categories.retain(|category| category.id != id);
        if categories.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthorsRepo for MemoryBackend {
    async fn list(
        &self,
        search: Option<&str>,
        include_inactive: bool,
        page: PageRequest,
    ) -> Result<Paginated<AuthorRecord>, RepoError> {
        let mut rows: Vec<_> = self
            .authors
            .lock()
            .await
            .iter()
            .filter(|author| include_inactive || author.active)
            .filter(|author| search.is_none_or(|search| contains_ci(&author.name, search)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page_of(rows, page))
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<AuthorRecord>, RepoError> {
        Ok(self
            .authors
            .lock()
            .await
            .iter()
            .find(|author| author.id == id)
            .cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<AuthorRecord>, RepoError> {
        Ok(self
            .authors
            .lock()
            .await
            .iter()
            .find(|author| author.slug == slug)
            .cloned())
    }

    async fn create(&self, author: &NewAuthor) -> Result<AuthorRecord, RepoError> {
        let mut authors = self.authors.lock().await;
        if authors.iter().any(|existing| existing.slug == author.slug) {
            return Err(RepoError::Duplicate {
                constraint: "authors_slug_key".to_string(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = AuthorRecord {
            id: self.next_id(),
            slug: author.slug.clone(),
            name: author.name.clone(),
            bio: author.bio.clone(),
            avatar_url: author.avatar_url.clone(),
            email: author.email.clone(),
            active: author.active,
            created_at: now,
            updated_at: now,
        };
        authors.push(record.clone());
        Ok(record)
    }

    async fn update(&self, author: &AuthorRecord) -> Result<AuthorRecord, RepoError> {
        let mut authors = self.authors.lock().await;
        let row = authors
            .iter_mut()
            .find(|existing| existing.id == author.id)
            .ok_or(RepoError::NotFound)?;
        *row = author.clone();
        Ok(author.clone())
    }

    async fn delete(&self, id: u32) -> Result<(), RepoError> {
        let mut authors = self.authors.lock().await;
        let before = authors.len();
        authors.retain(|author| author.id != id);
        if authors.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

fn payload_text(record: &FormSubmissionRecord, field: &str) -> String {
    match record.payload.get(field) {
        Some(Value::String(text)) => text.to_lowercase(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl SubmissionsRepo for MemoryBackend {
    async fn create(&self, submission: &NewSubmission) -> Result<FormSubmissionRecord, RepoError> {
        let record = FormSubmissionRecord {
            id: self.next_id(),
            category: submission.category,
            payload: submission.payload.clone(),
            metadata: submission.metadata.clone(),
            status: SubmissionStatus::Pending,
            processed_at: None,
            processed_by: None,
            notes: None,
        };
        self.submissions.lock().await.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<FormSubmissionRecord>, RepoError> {
        Ok(self
            .submissions
            .lock()
            .await
            .iter()
            .find(|submission| submission.id == id)
            .cloned())
    }

    async fn list(
        &self,
        filter: &SubmissionFilter,
        page: PageRequest,
    ) -> Result<Paginated<FormSubmissionRecord>, RepoError> {
        let mut rows: Vec<_> = self
            .submissions
            .lock()
            .await
            .iter()
            .filter(|row| filter.category.is_none_or(|category| row.category == category))
            .filter(|row| filter.status.is_none_or(|status| row.status == status))
            .filter(|row| {
                filter
                    .search
                    .as_deref()
                    .is_none_or(|search| contains_ci(&row.payload.to_string(), search))
            })
            .filter(|row| {
                filter
                    .submitted_after
                    .is_none_or(|after| row.metadata.submitted_at >= after)
                    && filter
                        .submitted_before
                        .is_none_or(|before| row.metadata.submitted_at <= before)
            })
            .cloned()
            .collect();
        match &filter.sort {
            SubmissionSort::SubmittedAt => rows.sort_by(|a, b| {
                a.metadata
                    .submitted_at
                    .cmp(&b.metadata.submitted_at)
                    .then(a.id.cmp(&b.id))
            }),
            SubmissionSort::PayloadField(field) => rows.sort_by(|a, b| {
                payload_text(a, field)
                    .cmp(&payload_text(b, field))
                    .then(a.id.cmp(&b.id))
            }),
        }
        if filter.direction == SortDirection::Desc {
            rows.reverse();
        }
        Ok(page_of(rows, page))
    }

    async fn update(
        &self,
        submission: &FormSubmissionRecord,
    ) -> Result<FormSubmissionRecord, RepoError> {
        let mut submissions = self.submissions.lock().await;
        let row = submissions
            .iter_mut()
            .find(|existing| existing.id == submission.id)
            .ok_or(RepoError::NotFound)?;
        *row = submission.clone();
        Ok(submission.clone())
    }

    async fn delete(&self, id: u32) -> Result<(), RepoError> {
        let mut submissions = self.submissions.lock().await;
        let before = submissions.len();
        submissions.retain(|submission| submission.id != id);
        if submissions.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl AttachmentsRepo for MemoryBackend {
    async fn insert(&self, attachment: &NewAttachment) -> Result<ImageAttachmentRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = ImageAttachmentRecord {
            id: self.next_id(),
            report_id: attachment.report_id,
            cdn_image_id: attachment.cdn_image_id.clone(),
            url: attachment.url.clone(),
            title: attachment.title.clone(),
            active: true,
            uploaded_by: attachment.uploaded_by,
            created_at: now,
            updated_at: now,
        };
        self.attachments.lock().await.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<ImageAttachmentRecord>, RepoError> {
        Ok(self
            .attachments
            .lock()
            .await
            .iter()
            .find(|attachment| attachment.id == id)
            .cloned())
    }

    async fn list_for_report(
        &self,
        report_id: u32,
        include_inactive: bool,
    ) -> Result<Vec<ImageAttachmentRecord>, RepoError> {
        Ok(self
            .attachments
            .lock()
            .await
            .iter()
            .filter(|attachment| attachment.report_id == report_id)
            .filter(|attachment| include_inactive || attachment.active)
            .cloned()
            .collect())
    }

    async fn set_active(
        &self,
        id: u32,
        active: bool,
        at: OffsetDateTime,
    ) -> Result<ImageAttachmentRecord, RepoError> {
        let mut attachments = self.attachments.lock().await;
        let row = attachments
            .iter_mut()
            .find(|attachment| attachment.id == id)
            .ok_or(RepoError::NotFound)?;
        row.active = active;
        row.updated_at = at;
        Ok(row.clone())
    }
}

#[async_trait]
impl AuditRepo for MemoryBackend {
    async fn append(&self, entry: &AuditEntry) -> Result<AuditRecord, RepoError> {
        let mut audit = self.audit.lock().await;
        let record = AuditRecord {
            id: audit.len() as u64 + 1,
            principal_id: entry.principal_id,
            principal_email: entry.principal_email.clone(),
            principal_role: entry.principal_role,
            action: entry.action.clone(),
            entity_kind: entry.entity_kind.clone(),
            entity_id: entry.entity_id.clone(),
            ip: entry.ip.clone(),
            user_agent: entry.user_agent.clone(),
            request_id: entry.request_id.clone(),
            changes: entry.changes.clone(),
            status: entry.status,
            error_message: entry.error_message.clone(),
            created_at: entry.created_at,
        };
        audit.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<AuditRecord>, RepoError> {
        Ok(self
            .audit
            .lock()
            .await
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    async fn list(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> Result<Paginated<AuditRecord>, RepoError> {
        let mut rows: Vec<_> = self
            .audit
            .lock()
            .await
            .iter()
            .filter(|row| filter.principal_id.is_none_or(|id| row.principal_id == Some(id)))
            .filter(|row| filter.action.as_deref().is_none_or(|action| row.action == action))
            .filter(|row| {
                filter
                    .entity_kind
                    .as_deref()
                    .is_none_or(|kind| row.entity_kind == kind)
            })
            .filter(|row| {
                filter
                    .entity_id
                    .as_deref()
                    .is_none_or(|id| row.entity_id.as_deref() == Some(id))
            })
            .filter(|row| filter.status.is_none_or(|status| row.status == status))
            .filter(|row| filter.created_after.is_none_or(|after| row.created_at >= after))
            .filter(|row| filter.created_before.is_none_or(|before| row.created_at <= before))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page_of(rows, page))
    }
}

fn stats_of<R: Publishable>(kind: ContentKind, rows: &[R]) -> ContentStats {
    let mut counts = StatusCounts {
        draft: 0,
        review: 0,
        published: 0,
        deleted: 0,
    };
    let mut scheduled = 0;
    for row in rows {
        let core = row.core();
        if core.is_deleted() {
            counts.deleted += 1;
            continue;
        }
        match core.status {
            ContentStatus::Draft => counts.draft += 1,
            ContentStatus::Review => counts.review += 1,
            ContentStatus::Published => counts.published += 1,
        }
        if core.scheduled_publish_enabled {
            scheduled += 1;
        }
    }
    ContentStats {
        kind,
        counts,
        scheduled,
    }
}

#[async_trait]
impl DashboardRepo for MemoryBackend {
    async fn dashboard_stats(&self) -> Result<DashboardStats, RepoError> {
        let submissions = self.submissions.lock().await;
        Ok(DashboardStats {
            content: vec![
                stats_of(ContentKind::Report, &self.reports.lock().await),
                stats_of(ContentKind::Blog, &self.blogs.lock().await),
                stats_of(ContentKind::PressRelease, &self.press_releases.lock().await),
            ],
            submissions_pending: submissions
                .iter()
                .filter(|row| row.status == SubmissionStatus::Pending)
                .count() as u64,
            submissions_total: submissions.len() as u64,
            active_users: self
                .principals
                .lock()
                .await
                .iter()
                .filter(|principal| principal.active)
                .count() as u64,
            categories: self.categories.lock().await.len() as u64,
            authors: self.authors.lock().await.len() as u64,
        })
    }
}

#[async_trait]
impl HealthProbe for MemoryBackend {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.database_down.load(Ordering::SeqCst) {
            Err(RepoError::Persistence("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Image CDN double that records uploads and deletions.
#[derive(Default)]
pub struct FakeCdn {
    pub uploads: Mutex<Vec<(String, ImageMetadata)>>,
    pub deleted: Mutex<Vec<String>>,
    pub reject_uploads: AtomicBool,
    counter: AtomicU32,
}

#[async_trait]
impl ImageCdn for FakeCdn {
    async fn upload(
        &self,
        _bytes: Bytes,
        filename: &str,
        metadata: &ImageMetadata,
    ) -> Result<CdnImage, CdnError> {
        if self.reject_uploads.load(Ordering::SeqCst) {
            return Err(CdnError::Rejected {
                status: 400,
                message: "unsupported image".to_string(),
            });
        }
        let id = format!("img-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.uploads
            .lock()
            .await
            .push((filename.to_string(), metadata.clone()));
        Ok(CdnImage {
            url: format!("https://imagedelivery.test/{id}/public"),
            id,
        })
    }

    async fn delete(&self, image_id: &str) -> Result<(), CdnError> {
        self.deleted.lock().await.push(image_id.to_string());
        Ok(())
    }
}

pub fn test_security() -> SecurityConfig {
    SecurityConfig {
        jwt_secret: TEST_SECRET.to_vec(),
        issuer: "marketlens-test".to_string(),
        lifetimes: TokenLifetimes::default(),
        hash_cost: cheap_hash_cost(),
        general_rate: RatePolicy {
            window: Duration::from_secs(60),
            max_requests: 1_000,
        },
        login_rate: RatePolicy {
            window: Duration::from_secs(15 * 60),
            max_requests: 5,
        },
        trusted_proxies: vec![TRUSTED_PROXY.ip()],
        csrf: CsrfSettings {
            token_ttl: Duration::from_secs(3600),
            cookie_name: CSRF_COOKIE.to_string(),
            header_name: CSRF_HEADER.to_string(),
            secure_cookie: false,
        },
    }
}

pub fn cheap_hash_cost() -> HashCost {
    HashCost {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

/// Version history where another writer claims the next number first, `contended` times.
pub struct ContendedVersions {
    inner: Arc<MemoryBackend>,
    contended: AtomicU32,
}

impl ContendedVersions {
    pub fn new(inner: Arc<MemoryBackend>, contended: u32) -> Self {
        Self {
            inner,
            contended: AtomicU32::new(contended),
        }
    }
}

#[async_trait]
impl VersionsRepo for ContendedVersions {
    async fn max_version(&self, report_id: u32) -> Result<u32, RepoError> {
        self.inner.max_version(report_id).await
    }

    async fn insert_version(
        &self,
        version: &NewContentVersion,
    ) -> Result<ContentVersionRecord, RepoError> {
        let claimed = self
            .contended
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if claimed {
            let rival = NewContentVersion {
                published_by: None,
                ..version.clone()
            };
            self.inner.insert_version(&rival).await?;
        }
        self.inner.insert_version(version).await
    }

    async fn list_versions(&self, report_id: u32) -> Result<Vec<ContentVersionRecord>, RepoError> {
        self.inner.list_versions(report_id).await
    }
}

/// A router over fresh in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub state: ApiState,
    pub backend: Arc<MemoryBackend>,
    pub cdn: Arc<FakeCdn>,
    pub store: Arc<MemoryStore>,
    pub cache: Cache,
    audit_worker: Option<AuditWorker>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_security(test_security()).await
    }

    pub async fn with_security(security: SecurityConfig) -> Self {
        Self::build(security, |_, _| {}).await
    }

    /// Swap the version history port, e.g. for one that loses races.
    pub async fn with_versions(
        versions: impl FnOnce(Arc<MemoryBackend>) -> Arc<dyn VersionsRepo>,
    ) -> Self {
        Self::build(test_security(), |backend, backends| {
            backends.versions = versions(backend.clone());
        })
        .await
    }

    async fn build(
        security: SecurityConfig,
        customize: impl FnOnce(&Arc<MemoryBackend>, &mut Backends),
    ) -> Self {
        let backend = Arc::new(MemoryBackend::default());
        let cdn = Arc::new(FakeCdn::default());
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::new(store.clone(), CacheConfig::default());
        let (audit, audit_worker) = AuditSink::spawn(backend.clone(), 64);

        let mut backends = Backends {
            reports: backend.clone(),
            blogs: backend.clone(),
            press_releases: backend.clone(),
            versions: backend.clone(),
            principals: backend.clone(),
            categories: backend.clone(),
            authors: backend.clone(),
            submissions: backend.clone(),
            attachments: backend.clone(),
            audit: backend.clone(),
            dashboard: backend.clone(),
            health: backend.clone(),
            cdn: cdn.clone(),
        };
        customize(&backend, &mut backends);
        let state = ApiState::new(backends, cache.clone(), audit, security)
            .expect("api state should build");
        let router = build_router(state.clone(), 8 * 1024 * 1024);

        let app = Self {
            router,
            state,
            backend,
            cdn,
            store,
            cache,
            audit_worker: Some(audit_worker),
        };
        app.seed_principal(ADMIN_EMAIL, Role::Admin).await;
        app.seed_principal(EDITOR_EMAIL, Role::Editor).await;
        app.seed_principal(VIEWER_EMAIL, Role::Viewer).await;
        app
    }

    pub async fn seed_principal(&self, email: &str, role: Role) -> PrincipalRecord {
        let hasher = PasswordHasher::new(cheap_hash_cost()).expect("hasher");
        let password_hash = hasher.hash(PASSWORD).await.expect("hash password");
        PrincipalsRepo::create(
            self.backend.as_ref(),
            &NewPrincipal {
                email: email.to_string(),
                password_hash,
                name: email.split('@').next().unwrap_or(email).to_string(),
                role,
            },
        )
        .await
        .expect("seed principal")
    }

    pub async fn principal_id(&self, email: &str) -> u32 {
        PrincipalsRepo::find_by_email(self.backend.as_ref(), email)
            .await
            .expect("lookup")
            .expect("principal exists")
            .id
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    /// Log in and return the access token.
    pub async fn token_for(&self, email: &str) -> String {
        let response = self
            .send(json_request(
                "POST",
                "/api/v1/auth/login",
                &serde_json::json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login for {email}");
        let body = json_body(response).await;
        body["data"]["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }

    /// Wait until the background audit writer has flushed everything queued so far.
    pub async fn flush_audit(&mut self) {
        if let Some(worker) = self.audit_worker.take() {
            worker.shutdown(Duration::from_secs(5)).await;
        }
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn authed_json(method: &str, uri: &str, token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

/// Attach the socket peer the server would see for this request.
pub fn from_peer(mut request: Request<Body>, ip: &str) -> Request<Body> {
    let ip: IpAddr = ip.parse().expect("peer ip");
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::new(ip, 50_000)));
    request
}

/// Route the request through the trusted proxy, which reports `client` as the origin.
pub fn via_proxy(mut request: Request<Body>, client: &str) -> Request<Body> {
    request.extensions_mut().insert(ConnectInfo(TRUSTED_PROXY));
    request.headers_mut().insert(
        "x-forwarded-for",
        client.parse().expect("forwarded header"),
    );
    request
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn report_payload(title: &str) -> Value {
    serde_json::json!({
        "title": title,
        "summary": "A comprehensive look at insulin demand, pricing and supply across regions.",
        "geography": ["North America"],
        "status": "draft",
        "sections": [{ "title": "Overview", "body": "Market overview." }],
        "internal_notes": "pricing still under review"
    })
}

pub fn blog_payload(title: &str) -> Value {
    serde_json::json!({
        "title": title,
        "summary": "Short summary of the article.",
        "body": "Body text of the article with enough words to be meaningful."
    })
}
