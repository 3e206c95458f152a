//! The publishable-content abstraction and the typed create/patch inputs for each kind.

use std::fmt::Debug;

use marketlens_api_types::{
    BlogCreateRequest, BlogUpdateRequest, PressReleaseCreateRequest, PressReleaseUpdateRequest,
    ReportCreateRequest, ReportUpdateRequest,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use time::OffsetDateTime;

use super::{
    entities::{
        BlogRecord, ContentCore, FieldChange, FieldChanges, PressReleaseRecord, ReportRecord,
        VersionSnapshot,
    },
    types::{ContentKind, ContentStatus},
    validation::Validate,
};

/// Fields that change on every write and are left out of audit diffs.
const UNTRACKED_FIELDS: &[&str] = &["updated_at", "updated_by"];

pub trait Publishable:
    Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: ContentKind;

    fn core(&self) -> &ContentCore;
    fn core_mut(&mut self) -> &mut ContentCore;

    /// Text searched by the `search` filter.
    fn search_text(&self) -> Vec<&str> {
        let core = self.core();
        vec![core.title.as_str(), core.summary.as_str()]
    }

    fn geography(&self) -> &[String] {
        &[]
    }

    fn is_authored_by(&self, _author_id: u32) -> bool {
        false
    }

    /// Content frozen into the version history on an interactive publish.
    fn version_snapshot(&self) -> Option<VersionSnapshot> {
        None
    }

    fn strip_admin_fields(&mut self) {
        let core = self.core_mut();
        core.created_by = None;
        core.updated_by = None;
        core.internal_notes = None;
    }
}

impl Publishable for ReportRecord {
    const KIND: ContentKind = ContentKind::Report;

    fn core(&self) -> &ContentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ContentCore {
        &mut self.core
    }

    fn search_text(&self) -> Vec<&str> {
        let mut fields = vec![self.core.title.as_str(), self.core.summary.as_str()];
        if let Some(description) = self.description.as_deref() {
            fields.push(description);
        }
        fields
    }

    fn geography(&self) -> &[String] {
        &self.geography
    }

    fn is_authored_by(&self, author_id: u32) -> bool {
        self.author_ids.contains(&author_id)
    }

    fn version_snapshot(&self) -> Option<VersionSnapshot> {
        Some(VersionSnapshot {
            sections: self.sections.clone(),
            seo: self.core.seo.clone(),
        })
    }
}

impl Publishable for BlogRecord {
    const KIND: ContentKind = ContentKind::Blog;

    fn core(&self) -> &ContentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ContentCore {
        &mut self.core
    }

    fn is_authored_by(&self, author_id: u32) -> bool {
        self.author_id == Some(author_id)
    }
}

impl Publishable for PressReleaseRecord {
    const KIND: ContentKind = ContentKind::PressRelease;

    fn core(&self) -> &ContentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ContentCore {
        &mut self.core
    }
}

/// Input accepted by `create` for a content kind.
pub trait ContentDraft<R: Publishable>: Validate + Send + 'static {
    fn explicit_slug(&self) -> Option<&str>;
    fn title(&self) -> &str;
    fn summary(&self) -> &str;
    fn requested_status(&self) -> Option<ContentStatus>;
    fn into_record(self, core: ContentCore) -> R;
}

/// Partial update for a content kind. Slug and status are applied by the workflow engine;
/// `apply_to` handles everything else.
pub trait ContentPatch<R: Publishable>: Validate + Send + 'static {
    fn slug(&self) -> Option<&str>;
    fn status(&self) -> Option<ContentStatus>;
    fn apply_to(self, record: &mut R);
}

pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

fn normalize_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

macro_rules! apply_core_fields {
    ($core:expr, $source:expr) => {{
        let core: &mut ContentCore = $core;
        if let Some(title) = $source.title {
            core.title = title.trim().to_string();
        }
        if let Some(summary) = $source.summary {
            core.summary = summary.trim().to_string();
        }
        if let Some(category_id) = $source.category_id {
            core.category_id = Some(category_id);
        }
        if let Some(tags) = $source.tags {
            core.tags = normalize_tags(tags);
        }
        if let Some(publish_date) = $source.publish_date {
            core.publish_date = Some(publish_date);
        }
        if let Some(notes) = $source.internal_notes {
            core.internal_notes = blank_to_none(Some(notes));
        }
        if let Some(seo) = $source.seo {
            core.seo = seo;
        }
    }};
}

fn seed_core(
    mut core: ContentCore,
    category_id: Option<u32>,
    tags: Vec<String>,
    publish_date: Option<OffsetDateTime>,
    internal_notes: Option<String>,
    seo: Option<marketlens_api_types::SeoMeta>,
) -> ContentCore {
    core.category_id = category_id;
    core.tags = normalize_tags(tags);
    core.publish_date = publish_date;
    core.internal_notes = blank_to_none(internal_notes);
    core.seo = seo.unwrap_or_default();
    core
}

impl ContentDraft<ReportRecord> for ReportCreateRequest {
    fn explicit_slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn summary(&self) -> &str {
        &self.summary
    }

    fn requested_status(&self) -> Option<ContentStatus> {
        self.status
    }

    fn into_record(self, core: ContentCore) -> ReportRecord {
        let core = seed_core(
            core,
            self.category_id,
            self.tags,
            self.publish_date,
            self.internal_notes,
            self.seo,
        );
        ReportRecord {
            core,
            description: blank_to_none(self.description),
            sections: self.sections,
            geography: normalize_list(self.geography),
            price: self.price,
            discount: self.discount,
            currency: blank_to_none(self.currency).map(|code| code.to_uppercase()),
            page_count: self.page_count,
            market_metrics: self.market_metrics,
            key_players: normalize_list(self.key_players),
            faqs: self.faqs,
            thumbnail_url: blank_to_none(self.thumbnail_url),
            author_ids: self.author_ids,
        }
    }
}

impl ContentPatch<ReportRecord> for ReportUpdateRequest {
    fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn status(&self) -> Option<ContentStatus> {
        self.status
    }

    fn apply_to(self, record: &mut ReportRecord) {
        apply_core_fields!(&mut record.core, self);
        if let Some(description) = self.description {
            record.description = blank_to_none(Some(description));
        }
        if let Some(sections) = self.sections {
            record.sections = sections;
        }
        if let Some(geography) = self.geography {
            record.geography = normalize_list(geography);
        }
        if let Some(price) = self.price {
            record.price = Some(price);
        }
        if let Some(discount) = self.discount {
            record.discount = Some(discount);
        }
        if let Some(currency) = self.currency {
            record.currency = blank_to_none(Some(currency)).map(|code| code.to_uppercase());
        }
        if let Some(page_count) = self.page_count {
            record.page_count = Some(page_count);
        }
        if let Some(metrics) = self.market_metrics {
            record.market_metrics = Some(metrics);
        }
        if let Some(players) = self.key_players {
            record.key_players = normalize_list(players);
        }
        if let Some(faqs) = self.faqs {
            record.faqs = faqs;
        }
        if let Some(url) = self.thumbnail_url {
            record.thumbnail_url = blank_to_none(Some(url));
        }
        if let Some(author_ids) = self.author_ids {
            record.author_ids = author_ids;
        }
    }
}

impl ContentDraft<BlogRecord> for BlogCreateRequest {
    fn explicit_slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn summary(&self) -> &str {
        &self.summary
    }

    fn requested_status(&self) -> Option<ContentStatus> {
        self.status
    }

    fn into_record(self, core: ContentCore) -> BlogRecord {
        let core = seed_core(
            core,
            self.category_id,
            self.tags,
            self.publish_date,
            self.internal_notes,
            self.seo,
        );
        BlogRecord {
            core,
            body: self.body,
            author_id: self.author_id,
            reading_minutes: self.reading_minutes,
            featured_image_url: blank_to_none(self.featured_image_url),
        }
    }
}

impl ContentPatch<BlogRecord> for BlogUpdateRequest {
    fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn status(&self) -> Option<ContentStatus> {
        self.status
    }

    fn apply_to(self, record: &mut BlogRecord) {
        apply_core_fields!(&mut record.core, self);
        if let Some(body) = self.body {
            record.body = body;
        }
        if let Some(author_id) = self.author_id {
            record.author_id = Some(author_id);
        }
        if let Some(minutes) = self.reading_minutes {
            record.reading_minutes = Some(minutes);
        }
        if let Some(url) = self.featured_image_url {
            record.featured_image_url = blank_to_none(Some(url));
        }
    }
}

impl ContentDraft<PressReleaseRecord> for PressReleaseCreateRequest {
    fn explicit_slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn summary(&self) -> &str {
        &self.summary
    }

    fn requested_status(&self) -> Option<ContentStatus> {
        self.status
    }

    fn into_record(self, core: ContentCore) -> PressReleaseRecord {
        let core = seed_core(
            core,
            self.category_id,
            self.tags,
            self.publish_date,
            self.internal_notes,
            self.seo,
        );
        PressReleaseRecord {
            core,
            body: self.body,
            location: blank_to_none(self.location),
            contact_name: blank_to_none(self.contact_name),
            contact_email: blank_to_none(self.contact_email),
        }
    }
}

impl ContentPatch<PressReleaseRecord> for PressReleaseUpdateRequest {
    fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn status(&self) -> Option<ContentStatus> {
        self.status
    }

    fn apply_to(self, record: &mut PressReleaseRecord) {
        apply_core_fields!(&mut record.core, self);
        if let Some(body) = self.body {
            record.body = body;
        }
        if let Some(location) = self.location {
            record.location = blank_to_none(Some(location));
        }
        if let Some(name) = self.contact_name {
            record.contact_name = blank_to_none(Some(name));
        }
        if let Some(email) = self.contact_email {
            record.contact_email = blank_to_none(Some(email));
        }
    }
}

/// Top-level fields whose serialised value differs between `before` and `after`.
pub fn diff_fields<T: Serialize>(before: &T, after: &T) -> FieldChanges {
    let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
        (serde_json::to_value(before), serde_json::to_value(after))
    else {
        return FieldChanges::new();
    };

    let mut changes = FieldChanges::new();
    for (key, new_value) in &new {
        if UNTRACKED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let old_value = old.get(key).cloned().unwrap_or(Value::Null);
        if &old_value != new_value {
            changes.insert(
                key.clone(),
                FieldChange {
                    old: old_value,
                    new: new_value.clone(),
                },
            );
        }
    }
    changes
}
