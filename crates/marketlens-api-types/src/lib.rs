//! Wire types shared between the MarketLens server and its API clients.
//!
//! Enums carry an optional `sqlx` derive so the server can bind them straight into
//! Postgres enum columns; DTOs are plain serde structs.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $pg:literal, $label:literal {
            $($variant:ident => $wire:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
        #[cfg_attr(feature = "sqlx", sqlx(type_name = $pg, rename_all = "snake_case"))]
        pub enum $name {
            $(
                #[serde(rename = $wire $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
                match normalized.as_str() {
                    $($wire $(| $alias)* => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $label,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

/// Raised when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: `{}`", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

wire_enum! {
    /// Editorial lifecycle state of a report, blog or press release.
    ContentStatus, "content_status", "status" {
        Draft => "draft",
        Review => "review" | "pending_review",
        Published => "published",
    }
}

wire_enum! {
    /// Principal role; privilege levels live in the server-side role catalogue.
    Role, "user_role", "role" {
        Viewer => "viewer",
        Editor => "editor",
        Admin => "admin",
    }
}

wire_enum! {
    SubmissionCategory, "submission_category", "submission category" {
        Contact => "contact",
        RequestSample => "request_sample",
    }
}

wire_enum! {
    SubmissionStatus, "submission_status", "submission status" {
        Pending => "pending",
        Processed => "processed",
        Archived => "archived",
    }
}

wire_enum! {
    AuditOutcome, "audit_outcome", "audit outcome" {
        Success => "success",
        Failure => "failure",
    }
}

/// Uniform response envelope returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: None,
        }
    }

    pub fn paged(data: T, meta: PageMeta) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(meta),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

// ---------------------------------------------------------------------------
// Structured JSON columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeoMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSegment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_percent: Option<f64>,
}

/// Headline market figures for a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value_usd_millions: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_value_usd_millions: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cagr_percent: Option<f64>,
    #[serde(default)]
    pub segments: Vec<MarketSegment>,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreateRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Viewer
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdateRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub password: Option<String>,
}

// ---------------------------------------------------------------------------
// Publishable content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCreateRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
    #[serde(default)]
    pub geography: Vec<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub market_metrics: Option<MarketMetrics>,
    #[serde(default)]
    pub key_players: Vec<String>,
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub author_ids: Vec<u32>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub seo: Option<SeoMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportUpdateRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<u32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub sections: Option<Vec<ReportSection>>,
    #[serde(default)]
    pub geography: Option<Vec<String>>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub market_metrics: Option<MarketMetrics>,
    #[serde(default)]
    pub key_players: Option<Vec<String>>,
    #[serde(default)]
    pub faqs: Option<Vec<Faq>>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub author_ids: Option<Vec<u32>>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub seo: Option<SeoMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogCreateRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub category_id: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub author_id: Option<u32>,
    #[serde(default)]
    pub reading_minutes: Option<u32>,
    #[serde(default)]
    pub featured_image_url: Option<String>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub seo: Option<SeoMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogUpdateRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub category_id: Option<u32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub author_id: Option<u32>,
    #[serde(default)]
    pub reading_minutes: Option<u32>,
    #[serde(default)]
    pub featured_image_url: Option<String>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub seo: Option<SeoMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressReleaseCreateRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub category_id: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub seo: Option<SeoMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PressReleaseUpdateRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub category_id: Option<u32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub publish_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub seo: Option<SeoMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub publish_date: OffsetDateTime,
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorRequest {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

// ---------------------------------------------------------------------------
// Form submissions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionCreateRequest {
    pub category: SubmissionCategory,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionUpdateRequest {
    #[serde(default)]
    pub status: Option<SubmissionStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}
