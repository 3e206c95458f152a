//! Persisted records and the read models built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

pub use marketlens_api_types::{Faq, MarketMetrics, MarketSegment, ReportSection, SeoMeta};

use super::types::{
    AuditOutcome, ContentKind, ContentStatus, Role, SubmissionCategory, SubmissionStatus,
};

/// A staff account able to authenticate against the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalRecord {
    pub id: u32,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Attributes shared by every publishable content kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCore {
    pub id: u32,
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub category_id: Option<u32>,
    pub tags: Vec<String>,
    pub status: ContentStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    pub scheduled_publish_enabled: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub created_by: Option<u32>,
    pub updated_by: Option<u32>,
    pub internal_notes: Option<String>,
    pub seo: SeoMeta,
}

impl ContentCore {
    /// A fresh core for a row that has not been persisted yet (`id == 0`).
    pub fn new_draft(
        slug: String,
        title: String,
        summary: String,
        actor: Option<u32>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: 0,
            slug,
            title,
            summary,
            category_id: None,
            tags: Vec::new(),
            status: ContentStatus::Draft,
            publish_date: None,
            scheduled_publish_enabled: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            created_by: actor,
            updated_by: actor,
            internal_notes: None,
            seo: SeoMeta::default(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    #[serde(flatten)]
    pub core: ContentCore,
    pub description: Option<String>,
    pub sections: Vec<ReportSection>,
    pub geography: Vec<String>,
    pub price: Option<f64>,
    pub discount: Option<f64>,
    pub currency: Option<String>,
    pub page_count: Option<u32>,
    pub market_metrics: Option<MarketMetrics>,
    pub key_players: Vec<String>,
    pub faqs: Vec<Faq>,
    pub thumbnail_url: Option<String>,
    pub author_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogRecord {
    #[serde(flatten)]
    pub core: ContentCore,
    pub body: String,
    pub author_id: Option<u32>,
    pub reading_minutes: Option<u32>,
    pub featured_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressReleaseRecord {
    #[serde(flatten)]
    pub core: ContentCore,
    pub body: String,
    pub location: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
}

/// What a report publish freezes into its version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub sections: Vec<ReportSection>,
    pub seo: SeoMeta,
}

/// Immutable publish snapshot of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentVersionRecord {
    pub id: u32,
    pub report_id: u32,
    pub version_number: u32,
    pub published_by: Option<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    pub sections: Vec<ReportSection>,
    pub seo: SeoMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContentVersion {
    pub report_id: u32,
    pub version_number: u32,
    pub published_by: Option<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    pub snapshot: VersionSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachmentRecord {
    pub id: u32,
    pub report_id: u32,
    pub cdn_image_id: String,
    pub url: String,
    pub title: Option<String>,
    pub active: bool,
    pub uploaded_by: Option<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Report read model returned by detail endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: ReportRecord,
    pub versions: Vec<ContentVersionRecord>,
    pub images: Vec<ImageAttachmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmissionRecord {
    pub id: u32,
    pub category: SubmissionCategory,
    pub payload: Value,
    pub metadata: SubmissionMetadata,
    pub status: SubmissionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
    pub processed_by: Option<u32>,
    pub notes: Option<String>,
}

/// Before/after pair for one changed field in an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

pub type FieldChanges = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: u64,
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
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: u32,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub id: u32,
    pub slug: String,
    pub name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub draft: u64,
    pub review: u64,
    pub published: u64,
    pub deleted: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.draft + self.review + self.published
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentStats {
    pub kind: ContentKind,
    pub counts: StatusCounts,
    pub scheduled: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub content: Vec<ContentStats>,
    pub submissions_pending: u64,
    pub submissions_total: u64,
    pub active_users: u64,
    pub categories: u64,
    pub authors: u64,
}
