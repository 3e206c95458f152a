//! One generic `ContentStore` over the three content tables.
//!
//! The shared columns live in [`CoreRow`]; each kind adds its own columns through
//! [`ContentTable`].

use async_trait::async_trait;
use sqlx::{
    FromRow, Postgres, QueryBuilder,
    postgres::PgRow,
    query_builder::Separated,
    types::Json,
};
use time::OffsetDateTime;

use crate::application::{
    pagination::{PageRequest, Paginated},
    repos::{ContentFilter, ContentStore, Promoted, RepoError, ScheduleRepo, VersionsRepo},
};
use crate::domain::{
    content::Publishable,
    entities::{
        BlogRecord, ContentCore, ContentVersionRecord, Faq, MarketMetrics, NewContentVersion,
        PressReleaseRecord, ReportRecord, ReportSection, SeoMeta,
    },
    types::{ContentKind, ContentStatus},
};

use super::{
    LIKE_ESCAPE, PostgresRepositories, bind_id, contains_pattern, map_sqlx_error, opt_bind_id,
    opt_row_id, row_id, to_u64,
};

const CORE_COLUMNS: &str = "id, slug, title, summary, category_id, tags, status, publish_date, \
    scheduled_publish_enabled, deleted_at, created_at, updated_at, created_by, updated_by, \
    internal_notes, seo";

const CORE_INSERT_COLUMNS: &str = "slug, title, summary, category_id, tags, status, publish_date, \
    scheduled_publish_enabled, created_at, updated_at, created_by, updated_by, internal_notes, seo";

type Values<'qb, 'args> = Separated<'qb, 'args, Postgres, &'static str>;

#[derive(FromRow)]
pub(crate) struct CoreRow {
    id: i32,
    slug: String,
    title: String,
    summary: String,
    category_id: Option<i32>,
    tags: Json<Vec<String>>,
    status: ContentStatus,
    publish_date: Option<OffsetDateTime>,
    scheduled_publish_enabled: bool,
    deleted_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    created_by: Option<i32>,
    updated_by: Option<i32>,
    internal_notes: Option<String>,
    seo: Json<SeoMeta>,
}

impl From<CoreRow> for ContentCore {
    fn from(row: CoreRow) -> Self {
        Self {
            id: row_id(row.id),
            slug: row.slug,
            title: row.title,
            summary: row.summary,
            category_id: opt_row_id(row.category_id),
            tags: row.tags.0,
            status: row.status,
            publish_date: row.publish_date,
            scheduled_publish_enabled: row.scheduled_publish_enabled,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: opt_row_id(row.created_by),
            updated_by: opt_row_id(row.updated_by),
            internal_notes: row.internal_notes,
            seo: row.seo.0,
        }
    }
}

fn push_core_values(values: &mut Values<'_, '_>, core: &ContentCore) {
    values.push_bind(core.slug.clone());
    values.push_bind(core.title.clone());
    values.push_bind(core.summary.clone());
    values.push_bind(opt_bind_id(core.category_id));
    values.push_bind(Json(core.tags.clone()));
    values.push_bind(core.status);
    values.push_bind(core.publish_date);
    values.push_bind(core.scheduled_publish_enabled);
    values.push_bind(core.created_at);
    values.push_bind(core.updated_at);
    values.push_bind(opt_bind_id(core.created_by));
    values.push_bind(opt_bind_id(core.updated_by));
    values.push_bind(core.internal_notes.clone());
    values.push_bind(Json(core.seo.clone()));
}

/// Assign `column = $n` through a separated builder.
macro_rules! assign {
    ($values:expr, $column:literal, $value:expr) => {
        $values.push(concat!($column, " = "));
        $values.push_bind_unseparated($value);
    };
}

fn push_core_assignments(values: &mut Values<'_, '_>, core: &ContentCore) {
    assign!(values, "slug", core.slug.clone());
    assign!(values, "title", core.title.clone());
    assign!(values, "summary", core.summary.clone());
    assign!(values, "category_id", opt_bind_id(core.category_id));
    assign!(values, "tags", Json(core.tags.clone()));
    assign!(values, "status", core.status);
    assign!(values, "publish_date", core.publish_date);
    assign!(values, "scheduled_publish_enabled", core.scheduled_publish_enabled);
    assign!(values, "updated_at", core.updated_at);
    assign!(values, "updated_by", opt_bind_id(core.updated_by));
    assign!(values, "internal_notes", core.internal_notes.clone());
    assign!(values, "seo", Json(core.seo.clone()));
}

/// Table-specific columns of a content kind.
pub(crate) trait ContentTable: Publishable {
    type Row: for<'r> FromRow<'r, PgRow> + Send + Unpin;

    /// Columns beyond the shared core, in insert order.
    const EXTRA_COLUMNS: &'static str;
    /// Columns matched by the `search` filter.
    const SEARCH_COLUMNS: &'static [&'static str] = &["title", "summary"];

    fn from_row(row: Self::Row) -> Self;
    fn push_extra_values(&self, values: &mut Values<'_, '_>);
    fn push_extra_assignments(&self, values: &mut Values<'_, '_>);

    /// Restrict to rows attributed to `author_id`; kinds without authors match nothing.
    fn push_author_filter(qb: &mut QueryBuilder<'_, Postgres>, _author_id: u32) {
        qb.push(" AND FALSE");
    }

    /// Kinds without a geography column ignore the filter.
    fn push_geography_filter(_qb: &mut QueryBuilder<'_, Postgres>, _geography: &[String]) {}
}

#[derive(FromRow)]
pub(crate) struct ReportRow {
    #[sqlx(flatten)]
    core: CoreRow,
    description: Option<String>,
    sections: Json<Vec<ReportSection>>,
    geography: Json<Vec<String>>,
    price: Option<f64>,
    discount: Option<f64>,
    currency: Option<String>,
    page_count: Option<i32>,
    market_metrics: Option<Json<MarketMetrics>>,
    key_players: Json<Vec<String>>,
    faqs: Json<Vec<Faq>>,
    thumbnail_url: Option<String>,
    author_ids: Json<Vec<u32>>,
}

impl ContentTable for ReportRecord {
    type Row = ReportRow;

    const EXTRA_COLUMNS: &'static str = "description, sections, geography, price, discount, \
        currency, page_count, market_metrics, key_players, faqs, thumbnail_url, author_ids";
    const SEARCH_COLUMNS: &'static [&'static str] = &["title", "summary", "description"];

    fn from_row(row: ReportRow) -> Self {
        Self {
            core: row.core.into(),
            description: row.description,
            sections: row.sections.0,
            geography: row.geography.0,
            price: row.price,
            discount: row.discount,
            currency: row.currency,
            page_count: row.page_count.and_then(|count| u32::try_from(count).ok()),
            market_metrics: row.market_metrics.map(|metrics| metrics.0),
            key_players: row.key_players.0,
            faqs: row.faqs.0,
            thumbnail_url: row.thumbnail_url,
            author_ids: row.author_ids.0,
        }
    }

    fn push_extra_values(&self, values: &mut Values<'_, '_>) {
        values.push_bind(self.description.clone());
        values.push_bind(Json(self.sections.clone()));
        values.push_bind(Json(self.geography.clone()));
        values.push_bind(self.price);
        values.push_bind(self.discount);
        values.push_bind(self.currency.clone());
        values.push_bind(self.page_count.and_then(|count| i32::try_from(count).ok()));
        values.push_bind(self.market_metrics.clone().map(Json));
        values.push_bind(Json(self.key_players.clone()));
        values.push_bind(Json(self.faqs.clone()));
        values.push_bind(self.thumbnail_url.clone());
        values.push_bind(Json(self.author_ids.clone()));
    }

    fn push_extra_assignments(&self, values: &mut Values<'_, '_>) {
        assign!(values, "description", self.description.clone());
        assign!(values, "sections", Json(self.sections.clone()));
        assign!(values, "geography", Json(self.geography.clone()));
        assign!(values, "price", self.price);
        assign!(values, "discount", self.discount);
        assign!(values, "currency", self.currency.clone());
        assign!(
            values,
            "page_count",
            self.page_count.and_then(|count| i32::try_from(count).ok())
        );
        assign!(values, "market_metrics", self.market_metrics.clone().map(Json));
        assign!(values, "key_players", Json(self.key_players.clone()));
        assign!(values, "faqs", Json(self.faqs.clone()));
        assign!(values, "thumbnail_url", self.thumbnail_url.clone());
        assign!(values, "author_ids", Json(self.author_ids.clone()));
    }

    fn push_author_filter(qb: &mut QueryBuilder<'_, Postgres>, author_id: u32) {
        qb.push(" AND author_ids @> jsonb_build_array(");
        qb.push_bind(i64::from(author_id));
        qb.push(")");
    }

    fn push_geography_filter(qb: &mut QueryBuilder<'_, Postgres>, geography: &[String]) {
        qb.push(" AND geography ?| ");
        qb.push_bind(geography.to_vec());
    }
}

#[derive(FromRow)]
pub(crate) struct BlogRow {
    #[sqlx(flatten)]
    core: CoreRow,
    body: String,
    author_id: Option<i32>,
    reading_minutes: Option<i32>,
    featured_image_url: Option<String>,
}

impl ContentTable for BlogRecord {
    type Row = BlogRow;

    const EXTRA_COLUMNS: &'static str = "body, author_id, reading_minutes, featured_image_url";

    fn from_row(row: BlogRow) -> Self {
        Self {
            core: row.core.into(),
            body: row.body,
            author_id: opt_row_id(row.author_id),
            reading_minutes: row.reading_minutes.and_then(|value| u32::try_from(value).ok()),
            featured_image_url: row.featured_image_url,
        }
    }

    fn push_extra_values(&self, values: &mut Values<'_, '_>) {
        values.push_bind(self.body.clone());
        values.push_bind(opt_bind_id(self.author_id));
        values.push_bind(self.reading_minutes.and_then(|value| i32::try_from(value).ok()));
        values.push_bind(self.featured_image_url.clone());
    }

    fn push_extra_assignments(&self, values: &mut Values<'_, '_>) {
        assign!(values, "body", self.body.clone());
        assign!(values, "author_id", opt_bind_id(self.author_id));
        assign!(
            values,
            "reading_minutes",
            self.reading_minutes.and_then(|value| i32::try_from(value).ok())
        );
        assign!(values, "featured_image_url", self.featured_image_url.clone());
    }

    fn push_author_filter(qb: &mut QueryBuilder<'_, Postgres>, author_id: u32) {
        qb.push(" AND author_id = ");
        qb.push_bind(opt_bind_id(Some(author_id)));
    }
}

#[derive(FromRow)]
pub(crate) struct PressReleaseRow {
    #[sqlx(flatten)]
    core: CoreRow,
    body: String,
    location: Option<String>,
    contact_name: Option<String>,
    contact_email: Option<String>,
}

impl ContentTable for PressReleaseRecord {
    type Row = PressReleaseRow;

    const EXTRA_COLUMNS: &'static str = "body, location, contact_name, contact_email";

    fn from_row(row: PressReleaseRow) -> Self {
        Self {
            core: row.core.into(),
            body: row.body,
            location: row.location,
            contact_name: row.contact_name,
            contact_email: row.contact_email,
        }
    }

    fn push_extra_values(&self, values: &mut Values<'_, '_>) {
        values.push_bind(self.body.clone());
        values.push_bind(self.location.clone());
        values.push_bind(self.contact_name.clone());
        values.push_bind(self.contact_email.clone());
    }

    fn push_extra_assignments(&self, values: &mut Values<'_, '_>) {
        assign!(values, "body", self.body.clone());
        assign!(values, "location", self.location.clone());
        assign!(values, "contact_name", self.contact_name.clone());
        assign!(values, "contact_email", self.contact_email.clone());
    }
}

fn select_prefix<R: ContentTable>() -> String {
    format!(
        "SELECT {CORE_COLUMNS}, {} FROM {} ",
        R::EXTRA_COLUMNS,
        R::KIND.family()
    )
}

fn returning<R: ContentTable>() -> String {
    format!(" RETURNING {CORE_COLUMNS}, {}", R::EXTRA_COLUMNS)
}

fn push_filter<R: ContentTable>(qb: &mut QueryBuilder<'_, Postgres>, filter: &ContentFilter) {
    qb.push(" WHERE 1=1");
    if !filter.show_deleted {
        qb.push(" AND deleted_at IS NULL");
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
    if let Some(category) = filter.category_slug.as_ref() {
        qb.push(" AND category_id IN (SELECT id FROM categories WHERE slug = ");
        qb.push_bind(category.clone());
        qb.push(")");
    }
    if !filter.geography.is_empty() {
        R::push_geography_filter(qb, &filter.geography);
    }
    if let Some(search) = filter.search.as_ref().filter(|value| !value.trim().is_empty()) {
        let pattern = contains_pattern(search.trim());
        qb.push(" AND (");
        for (index, column) in R::SEARCH_COLUMNS.iter().enumerate() {
            if index > 0 {
                qb.push(" OR ");
            }
            qb.push(format!("COALESCE({column}, '') ILIKE "));
            qb.push_bind(pattern.clone());
            qb.push(LIKE_ESCAPE);
        }
        qb.push(")");
    }
    if let Some(author_id) = filter.author_id {
        R::push_author_filter(qb, author_id);
    }
    if let Some(created_by) = filter.created_by {
        qb.push(" AND created_by = ");
        qb.push_bind(opt_bind_id(Some(created_by)));
    }
    if let Some(updated_by) = filter.updated_by {
        qb.push(" AND updated_by = ");
        qb.push_bind(opt_bind_id(Some(updated_by)));
    }

    let ranges = [
        ("created_at >= ", filter.created_after),
        ("created_at <= ", filter.created_before),
        ("updated_at >= ", filter.updated_after),
        ("updated_at <= ", filter.updated_before),
        ("publish_date >= ", filter.published_after),
        ("publish_date <= ", filter.published_before),
    ];
    for (condition, bound) in ranges {
        if let Some(bound) = bound {
            qb.push(" AND ");
            qb.push(condition);
            qb.push_bind(bound);
        }
    }
}

impl PostgresRepositories {
    async fn fetch_content<R: ContentTable>(
        &self,
        mut qb: QueryBuilder<'_, Postgres>,
    ) -> Result<Option<R>, RepoError> {
        let row = qb
            .build_query_as::<R::Row>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(R::from_row))
    }

    async fn touch_deleted<R: ContentTable>(
        &self,
        id: u32,
        deleted_at: Option<OffsetDateTime>,
        at: OffsetDateTime,
        actor: Option<u32>,
    ) -> Result<(), RepoError> {
        let guard = if deleted_at.is_some() {
            "deleted_at IS NULL"
        } else {
            "deleted_at IS NOT NULL"
        };
        let sql = format!(
            "UPDATE {} SET deleted_at = $1, updated_at = $2, updated_by = $3 \
             WHERE id = $4 AND {guard}",
            R::KIND.family()
        );
        let result = sqlx::query(&sql)
            .bind(deleted_at)
            .bind(at)
            .bind(opt_bind_id(actor))
            .bind(bind_id(id)?)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl<R: ContentTable> ContentStore<R> for PostgresRepositories {
    async fn create(&self, record: &R) -> Result<R, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "INSERT INTO {} ({CORE_INSERT_COLUMNS}, {}) VALUES (",
            R::KIND.family(),
            R::EXTRA_COLUMNS
        ));
        {
            let mut values = qb.separated(", ");
            push_core_values(&mut values, record.core());
            record.push_extra_values(&mut values);
        }
        qb.push(")");
        qb.push(returning::<R>());

        self.fetch_content(qb).await?.ok_or(RepoError::NotFound)
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<R>, RepoError> {
        let mut qb = QueryBuilder::new(select_prefix::<R>());
        qb.push("WHERE id = ");
        qb.push_bind(bind_id(id)?);
        self.fetch_content(qb).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<R>, RepoError> {
        let mut qb = QueryBuilder::new(select_prefix::<R>());
        qb.push("WHERE slug = ");
        qb.push_bind(slug.to_string());
        qb.push(" ORDER BY (deleted_at IS NULL) DESC, id DESC LIMIT 1");
        self.fetch_content(qb).await
    }

    async fn update(&self, record: &R) -> Result<R, RepoError> {
        let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", R::KIND.family()));
        {
            let mut values = qb.separated(", ");
            push_core_assignments(&mut values, record.core());
            record.push_extra_assignments(&mut values);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(bind_id(record.core().id)?);
        qb.push(returning::<R>());

        self.fetch_content(qb).await?.ok_or(RepoError::NotFound)
    }

    async fn soft_delete(
        &self,
        id: u32,
        at: OffsetDateTime,
        actor: Option<u32>,
    ) -> Result<(), RepoError> {
        self.touch_deleted::<R>(id, Some(at), at, actor).await
    }

    async fn restore(
        &self,
        id: u32,
        at: OffsetDateTime,
        actor: Option<u32>,
    ) -> Result<(), RepoError> {
        self.touch_deleted::<R>(id, None, at, actor).await
    }

    async fn delete(&self, id: u32) -> Result<(), RepoError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", R::KIND.family());
        let result = sqlx::query(&sql)
            .bind(bind_id(id)?)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &ContentFilter,
        page: PageRequest,
    ) -> Result<Paginated<R>, RepoError> {
        let mut count_qb =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", R::KIND.family()));
        push_filter::<R>(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(select_prefix::<R>());
        push_filter::<R>(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(page.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<R::Row>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(R::from_row).collect(),
            to_u64(total),
            page,
        ))
    }
}

#[derive(FromRow)]
struct VersionRow {
    id: i32,
    report_id: i32,
    version_number: i32,
    published_by: Option<i32>,
    published_at: OffsetDateTime,
    sections: Json<Vec<ReportSection>>,
    seo: Json<SeoMeta>,
}

impl From<VersionRow> for ContentVersionRecord {
    fn from(row: VersionRow) -> Self {
        Self {
            id: row_id(row.id),
            report_id: row_id(row.report_id),
            version_number: row_id(row.version_number),
            published_by: opt_row_id(row.published_by),
            published_at: row.published_at,
            sections: row.sections.0,
            seo: row.seo.0,
        }
    }
}

const VERSION_COLUMNS: &str =
    "id, report_id, version_number, published_by, published_at, sections, seo";

#[async_trait]
impl VersionsRepo for PostgresRepositories {
    async fn max_version(&self, report_id: u32) -> Result<u32, RepoError> {
        let max: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) FROM report_versions WHERE report_id = $1",
        )
        .bind(bind_id(report_id)?)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row_id(max))
    }

    async fn insert_version(
        &self,
        version: &NewContentVersion,
    ) -> Result<ContentVersionRecord, RepoError> {
        let sql = format!(
            "INSERT INTO report_versions \
             (report_id, version_number, published_by, published_at, sections, seo) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {VERSION_COLUMNS}"
        );
        let row: VersionRow = sqlx::query_as(&sql)
            .bind(bind_id(version.report_id)?)
            .bind(bind_id(version.version_number)?)
            .bind(opt_bind_id(version.published_by))
            .bind(version.published_at)
            .bind(Json(&version.snapshot.sections))
            .bind(Json(&version.snapshot.seo))
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn list_versions(&self, report_id: u32) -> Result<Vec<ContentVersionRecord>, RepoError> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM report_versions \
             WHERE report_id = $1 ORDER BY version_number ASC"
        );
        let rows: Vec<VersionRow> = sqlx::query_as(&sql)
            .bind(bind_id(report_id)?)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ContentVersionRecord::from).collect())
    }
}

#[derive(FromRow)]
struct PromotedRow {
    id: i32,
    slug: String,
}

#[async_trait]
impl ScheduleRepo for PostgresRepositories {
    async fn publish_due(
        &self,
        kind: ContentKind,
        now: OffsetDateTime,
    ) -> Result<Vec<Promoted>, RepoError> {
        let sql = format!(
            "UPDATE {} SET status = $1, scheduled_publish_enabled = FALSE, updated_at = $2 \
             WHERE scheduled_publish_enabled \
               AND status <> $1 \
               AND deleted_at IS NULL \
               AND publish_date IS NOT NULL \
               AND publish_date <= $2 \
             RETURNING id, slug",
            kind.family()
        );
        let rows: Vec<PromotedRow> = sqlx::query_as(&sql)
            .bind(ContentStatus::Published)
            .bind(now)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| Promoted {
                id: row_id(row.id),
                slug: row.slug,
            })
            .collect())
    }
}
