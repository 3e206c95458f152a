//! Handlers shared by the three publishable families, plus the report-only extras
//! (detail reads, version history and image attachments).

use axum::{
    extract::{Multipart, Path, State},
    response::Response,
};
use bytes::Bytes;
use marketlens_api_types::{
    BlogCreateRequest, BlogUpdateRequest, PressReleaseCreateRequest, PressReleaseUpdateRequest,
    ReportCreateRequest, ReportUpdateRequest, ScheduleRequest,
};
use serde::{Deserialize, de::DeserializeOwned};

use crate::application::{
    attachments::ImageUpload,
    content::WorkflowEngine,
    error::AppError,
    pagination::PageRequest,
    repos::ContentFilter,
};
use crate::domain::{
    content::{ContentDraft, ContentPatch, Publishable},
    roles::Permission,
    entities::{BlogRecord, PressReleaseRecord, ReportRecord},
    types::ContentStatus,
};
use crate::infra::http::api::{
    extract::{ApiJson, ApiQuery, Authenticated, Caller, parse_id, parse_optional_date},
    response,
    state::ApiState,
};

use super::parse_opt;

/// Binds a publishable record to its request bodies and its engine in the API state.
pub trait ContentResource: Publishable {
    type Create: ContentDraft<Self> + DeserializeOwned;
    type Update: ContentPatch<Self> + DeserializeOwned;

    fn engine(state: &ApiState) -> &WorkflowEngine<Self>;
}

impl ContentResource for ReportRecord {
    type Create = ReportCreateRequest;
    type Update = ReportUpdateRequest;

    fn engine(state: &ApiState) -> &WorkflowEngine<Self> {
        &state.reports
    }
}

impl ContentResource for BlogRecord {
    type Create = BlogCreateRequest;
    type Update = BlogUpdateRequest;

    fn engine(state: &ApiState) -> &WorkflowEngine<Self> {
        &state.blogs
    }
}

impl ContentResource for PressReleaseRecord {
    type Create = PressReleaseCreateRequest;
    type Update = PressReleaseUpdateRequest;

    fn engine(state: &ApiState) -> &WorkflowEngine<Self> {
        &state.press_releases
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub category: Option<String>,
    /// Comma-separated; rows matching any entry are returned.
    pub geography: Option<String>,
    pub search: Option<String>,
    pub author_id: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub updated_after: Option<String>,
    pub updated_before: Option<String>,
    pub published_after: Option<String>,
    pub published_before: Option<String>,
    pub show_deleted: Option<bool>,
}

impl ContentListQuery {
    fn into_filter(self) -> Result<(ContentFilter, PageRequest), AppError> {
        let page = PageRequest::new(self.page, self.limit);
        let geography = self
            .geography
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let filter = ContentFilter {
            status: parse_opt::<ContentStatus>("status", self.status.as_deref())?,
            category_slug: self
                .category
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            geography,
            search: self.search.filter(|value| !value.trim().is_empty()),
            author_id: parse_opt("author_id", self.author_id.as_deref())?,
            created_by: parse_opt("created_by", self.created_by.as_deref())?,
            updated_by: parse_opt("updated_by", self.updated_by.as_deref())?,
            created_after: parse_optional_date("created_after", self.created_after.as_deref())?,
            created_before: parse_optional_date("created_before", self.created_before.as_deref())?,
            updated_after: parse_optional_date("updated_after", self.updated_after.as_deref())?,
            updated_before: parse_optional_date("updated_before", self.updated_before.as_deref())?,
            published_after: parse_optional_date(
                "published_after",
                self.published_after.as_deref(),
            )?,
            published_before: parse_optional_date(
                "published_before",
                self.published_before.as_deref(),
            )?,
            show_deleted: self.show_deleted.unwrap_or(false),
        };
        Ok((filter, page))
    }
}

pub async fn list<R: ContentResource>(
    State(state): State<ApiState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<ContentListQuery>,
) -> Result<Response, AppError> {
    let (filter, page) = query.into_filter()?;
    let result = R::engine(&state)
        .list(filter, page, caller.is_privileged())
        .await?;
    Ok(response::paged(result))
}

/// Lookup by numeric id or slug.
pub async fn get<R: ContentResource>(
    State(state): State<ApiState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let record = R::engine(&state)
        .get_by_reference(&reference, caller.is_privileged())
        .await?;
    Ok(response::ok(record))
}

/// Report lookup returning versions and active images alongside the report.
pub async fn get_report(
    State(state): State<ApiState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let report = state
        .reports
        .get_by_reference(&reference, caller.is_privileged())
        .await?;
    let detail = state.reports.detail(report).await?;
    Ok(response::ok(detail))
}

pub async fn create<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(draft): ApiJson<R::Create>,
) -> Result<Response, AppError> {
    let actor = auth.require(Permission::ContentWrite)?;
    let record = R::engine(&state).create(&actor, draft).await?;
    Ok(response::created(record))
}

pub async fn update<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<R::Update>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentWrite)?;
    let record = R::engine(&state).update(&actor, id, patch).await?;
    Ok(response::ok(record))
}

pub async fn delete<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentDelete)?;
    R::engine(&state).delete(&actor, id).await?;
    Ok(response::no_content())
}

pub async fn soft_delete<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentWrite)?;
    R::engine(&state).soft_delete(&actor, id).await?;
    Ok(response::message(&format!("{} deleted", R::KIND.label())))
}

pub async fn restore<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentDelete)?;
    let record = R::engine(&state).restore(&actor, id).await?;
    Ok(response::ok(record))
}

pub async fn schedule<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<ScheduleRequest>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentWrite)?;
    let record = R::engine(&state)
        .schedule(&actor, id, request.publish_date)
        .await?;
    Ok(response::ok(record))
}

pub async fn cancel_schedule<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentWrite)?;
    let record = R::engine(&state).cancel_schedule(&actor, id).await?;
    Ok(response::ok(record))
}

pub async fn submit_review<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentWrite)?;
    let record = R::engine(&state).submit_for_review(&actor, id).await?;
    Ok(response::ok(record))
}

pub async fn approve<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentReview)?;
    let record = R::engine(&state).approve(&actor, id).await?;
    Ok(response::ok(record))
}

pub async fn reject<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentReview)?;
    let record = R::engine(&state).reject(&actor, id).await?;
    Ok(response::ok(record))
}

pub async fn unpublish<R: ContentResource>(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::ContentReview)?;
    let record = R::engine(&state).unpublish(&actor, id).await?;
    Ok(response::ok(record))
}

pub async fn report_versions(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let versions = state.reports.versions(id, caller.is_privileged()).await?;
    Ok(response::ok(versions))
}

/// Active images of a visible report; privileged callers also see deactivated ones.
pub async fn list_images(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let privileged = caller.is_privileged();
    state.reports.get_by_id(id, privileged).await?;
    let images = state.attachments.list(id, privileged).await?;
    Ok(response::ok(images))
}

/// Multipart upload: an `image` file part and an optional `title` text part.
pub async fn upload_image(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let actor = auth.require(Permission::MediaUpload)?;

    let mut file: Option<(Bytes, String, Option<String>)> = None;
    let mut title = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Invalid multipart body: {err}")))?
    {
        match field.name() {
            Some("image") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("Invalid image part: {err}")))?;
                file = Some((bytes, filename, content_type));
            }
            Some("title") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("Invalid title part: {err}")))?;
                title = Some(text).filter(|value| !value.trim().is_empty());
            }
            _ => {}
        }
    }

    let Some((bytes, filename, content_type)) = file else {
        return Err(AppError::bad_request("No image file provided"));
    };
    if bytes.is_empty() {
        return Err(AppError::bad_request("Uploaded image is empty"));
    }

    let upload = ImageUpload {
        bytes,
        filename,
        content_type,
        title,
    };
    let image = state.attachments.upload(&actor, id, upload).await?;
    Ok(response::created(image))
}

pub async fn soft_delete_image(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path((id, image_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (id, image_id) = (parse_id(&id)?, parse_id(&image_id)?);
    let actor = auth.require(Permission::MediaUpload)?;
    let image = state.attachments.soft_delete(&actor, id, image_id).await?;
    Ok(response::ok(image))
}

pub async fn restore_image(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path((id, image_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (id, image_id) = (parse_id(&id)?, parse_id(&image_id)?);
    let actor = auth.require(Permission::MediaUpload)?;
    let image = state.attachments.restore(&actor, id, image_id).await?;
    Ok(response::ok(image))
}
