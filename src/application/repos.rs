//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::pagination::{PageRequest, Paginated};
use crate::domain::content::Publishable;
use crate::domain::entities::{
    AuditRecord, AuthorRecord, CategoryRecord, ContentVersionRecord, DashboardStats,
    FieldChanges, FormSubmissionRecord, ImageAttachmentRecord, NewContentVersion,
    PrincipalRecord, SubmissionMetadata,
};
use crate::domain::types::{
    AuditOutcome, ContentKind, ContentStatus, Role, SubmissionCategory, SubmissionStatus,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, RepoError::Duplicate { .. })
    }
}

/// Filters accepted by every content list. Fields that do not apply to a kind
/// (geography on blogs, for example) are ignored by that kind's store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentFilter {
    pub status: Option<ContentStatus>,
    pub category_slug: Option<String>,
    pub geography: Vec<String>,
    pub search: Option<String>,
    pub author_id: Option<u32>,
    pub created_by: Option<u32>,
    pub updated_by: Option<u32>,
    pub created_after: Option<OffsetDateTime>,
    pub created_before: Option<OffsetDateTime>,
    pub updated_after: Option<OffsetDateTime>,
    pub updated_before: Option<OffsetDateTime>,
    pub published_after: Option<OffsetDateTime>,
    pub published_before: Option<OffsetDateTime>,
    pub show_deleted: bool,
}

impl ContentFilter {
    /// The projection enforced for unprivileged callers.
    pub fn public(mut self) -> Self {
        self.status = Some(ContentStatus::Published);
        self.show_deleted = false;
        self.created_by = None;
        self.updated_by = None;
        self
    }
}

#[async_trait]
pub trait ContentStore<R: Publishable>: Send + Sync {
    /// Insert a new row; the id on `record` is ignored and assigned by the store.
    async fn create(&self, record: &R) -> Result<R, RepoError>;

    /// Fetch by id, soft-deleted rows included.
    async fn find_by_id(&self, id: u32) -> Result<Option<R>, RepoError>;

    /// Fetch by slug, preferring the live row over tombstones that share the slug.
    async fn find_by_slug(&self, slug: &str) -> Result<Option<R>, RepoError>;

    /// Overwrite every mutable column of an existing row.
    async fn update(&self, record: &R) -> Result<R, RepoError>;

    async fn soft_delete(
        &self,
        id: u32,
        at: OffsetDateTime,
        actor: Option<u32>,
    ) -> Result<(), RepoError>;

    async fn restore(&self, id: u32, at: OffsetDateTime, actor: Option<u32>)
    -> Result<(), RepoError>;

    async fn delete(&self, id: u32) -> Result<(), RepoError>;

    async fn list(
        &self,
        filter: &ContentFilter,
        page: PageRequest,
    ) -> Result<Paginated<R>, RepoError>;
}

#[async_trait]
pub trait VersionsRepo: Send + Sync {
    /// Highest version number recorded for the report, `0` when none exist.
    async fn max_version(&self, report_id: u32) -> Result<u32, RepoError>;

    async fn insert_version(
        &self,
        version: &NewContentVersion,
    ) -> Result<ContentVersionRecord, RepoError>;

    /// Versions in ascending version order.
    async fn list_versions(&self, report_id: u32) -> Result<Vec<ContentVersionRecord>, RepoError>;
}

/// A row flipped to published by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promoted {
    pub id: u32,
    pub slug: String,
}

#[async_trait]
pub trait ScheduleRepo: Send + Sync {
    /// Promote, in one statement, every row of `kind` that is scheduled, not yet
    /// published and due at `now`; the schedule flag is cleared on the promoted rows.
    async fn publish_due(
        &self,
        kind: ContentKind,
        now: OffsetDateTime,
    ) -> Result<Vec<Promoted>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct PrincipalFilter {
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

#[async_trait]
pub trait PrincipalsRepo: Send + Sync {
    async fn find_by_id(&self, id: u32) -> Result<Option<PrincipalRecord>, RepoError>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>, RepoError>;

    async fn list(
        &self,
        filter: &PrincipalFilter,
        page: PageRequest,
    ) -> Result<Paginated<PrincipalRecord>, RepoError>;

    async fn create(&self, principal: &NewPrincipal) -> Result<PrincipalRecord, RepoError>;

    async fn update(&self, principal: &PrincipalRecord) -> Result<PrincipalRecord, RepoError>;

    async fn record_login(&self, id: u32, at: OffsetDateTime) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub active: bool,
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list(&self, include_inactive: bool) -> Result<Vec<CategoryRecord>, RepoError>;
    async fn find_by_id(&self, id: u32) -> Result<Option<CategoryRecord>, RepoError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<CategoryRecord>, RepoError>;
    async fn create(&self, category: &NewCategory) -> Result<CategoryRecord, RepoError>;
    async fn update(&self, category: &CategoryRecord) -> Result<CategoryRecord, RepoError>;
    async fn delete(&self, id: u32) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewAuthor {
    pub slug: String,
    pub name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
    pub active: bool,
}

#[async_trait]
pub trait AuthorsRepo: Send + Sync {
    async fn list(
        &self,
        search: Option<&str>,
        include_inactive: bool,
        page: PageRequest,
    ) -> Result<Paginated<AuthorRecord>, RepoError>;
    async fn find_by_id(&self, id: u32) -> Result<Option<AuthorRecord>, RepoError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<AuthorRecord>, RepoError>;
    async fn create(&self, author: &NewAuthor) -> Result<AuthorRecord, RepoError>;
    async fn update(&self, author: &AuthorRecord) -> Result<AuthorRecord, RepoError>;
    async fn delete(&self, id: u32) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub category: SubmissionCategory,
    pub payload: Value,
    pub metadata: SubmissionMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Submission ordering: by submission time or by a whitelisted payload field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionSort {
    #[default]
    SubmittedAt,
    PayloadField(String),
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub category: Option<SubmissionCategory>,
    pub status: Option<SubmissionStatus>,
    pub search: Option<String>,
    pub submitted_after: Option<OffsetDateTime>,
    pub submitted_before: Option<OffsetDateTime>,
    pub sort: SubmissionSort,
    pub direction: SortDirection,
}

#[async_trait]
pub trait SubmissionsRepo: Send + Sync {
    async fn create(&self, submission: &NewSubmission) -> Result<FormSubmissionRecord, RepoError>;
    async fn find_by_id(&self, id: u32) -> Result<Option<FormSubmissionRecord>, RepoError>;
    async fn list(
        &self,
        filter: &SubmissionFilter,
        page: PageRequest,
    ) -> Result<Paginated<FormSubmissionRecord>, RepoError>;
    async fn update(
        &self,
        submission: &FormSubmissionRecord,
    ) -> Result<FormSubmissionRecord, RepoError>;
    async fn delete(&self, id: u32) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub report_id: u32,
    pub cdn_image_id: String,
    pub url: String,
    pub title: Option<String>,
    pub uploaded_by: Option<u32>,
}

#[async_trait]
pub trait AttachmentsRepo: Send + Sync {
    async fn insert(&self, attachment: &NewAttachment)
    -> Result<ImageAttachmentRecord, RepoError>;
    async fn find_by_id(&self, id: u32) -> Result<Option<ImageAttachmentRecord>, RepoError>;
    async fn list_for_report(
        &self,
        report_id: u32,
        include_inactive: bool,
    ) -> Result<Vec<ImageAttachmentRecord>, RepoError>;
    async fn set_active(
        &self,
        id: u32,
        active: bool,
        at: OffsetDateTime,
    ) -> Result<ImageAttachmentRecord, RepoError>;
}

/// An audit record before persistence assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub principal_id: Option<u32>,
    pub principal_email: Option<String>,
    pub principal_role: Option<Role>,
    pub action: String,
    pub entity_kind: String,
    pub entity_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub changes: Option<FieldChanges>,
    pub status: AuditOutcome,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub principal_id: Option<u32>,
    pub action: Option<String>,
    pub entity_kind: Option<String>,
    pub entity_id: Option<String>,
    pub status: Option<AuditOutcome>,
    pub created_after: Option<OffsetDateTime>,
    pub created_before: Option<OffsetDateTime>,
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<AuditRecord, RepoError>;
    async fn find_by_id(&self, id: u64) -> Result<Option<AuditRecord>, RepoError>;
    /// Newest first.
    async fn list(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> Result<Paginated<AuditRecord>, RepoError>;
}

#[async_trait]
pub trait DashboardRepo: Send + Sync {
    async fn dashboard_stats(&self) -> Result<DashboardStats, RepoError>;
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
