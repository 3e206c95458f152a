//! Categories and authors referenced by publishable content.

use std::sync::Arc;

use marketlens_api_types::{AuthorRequest, CategoryRequest};
use time::OffsetDateTime;

use crate::application::{
    audit::AuditSink,
    context::Actor,
    error::AppError,
    pagination::{PageRequest, Paginated},
    repos::{AuditEntry, AuthorsRepo, CategoriesRepo, NewAuthor, NewCategory, RepoError},
};
use crate::domain::{
    content::diff_fields,
    entities::{AuthorRecord, CategoryRecord},
    slug::{SlugError, resolve_slug},
    validation::Validate,
};

fn slug_error(err: SlugError) -> AppError {
    AppError::bad_request(err.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Numeric references resolve by id, anything else by slug.
fn parse_reference(reference: &str) -> Result<u32, &str> {
    reference.parse::<u32>().map_err(|_| reference)
}

#[derive(Clone)]
pub struct CategoryService {
    repo: Arc<dyn CategoriesRepo>,
    audit: AuditSink,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoriesRepo>, audit: AuditSink) -> Self {
        Self { repo, audit }
    }

    fn repo_error(err: RepoError) -> AppError {
        match err {
            RepoError::NotFound => AppError::not_found("Category not found"),
            RepoError::Duplicate { .. } => {
                AppError::DuplicateSlug("A category with this slug already exists".to_string())
            }
            other => other.into(),
        }
    }

    /// Active categories only unless the caller may see drafts of the taxonomy.
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<CategoryRecord>, AppError> {
        Ok(self.repo.list(include_inactive).await?)
    }

    pub async fn get_by_slug(
        &self,
        slug: &str,
        include_inactive: bool,
    ) -> Result<CategoryRecord, AppError> {
        match self.repo.find_by_slug(slug).await? {
            Some(category) if category.active || include_inactive => Ok(category),
            _ => Err(AppError::not_found("Category not found")),
        }
    }

    pub async fn create(
        &self,
        actor: &Actor,
        request: CategoryRequest,
    ) -> Result<CategoryRecord, AppError> {
        request.validate()?;
        let slug = resolve_slug(request.slug.as_deref(), &request.name).map_err(slug_error)?;
        let created = self
            .repo
            .create(&NewCategory {
                slug,
                name: request.name.trim().to_string(),
                description: optional_text(request.description),
                sort_order: request.sort_order.unwrap_or(0),
                active: request.active.unwrap_or(true),
            })
            .await
            .map_err(Self::repo_error)?;

        self.audit.log_async(
            AuditEntry::new("category.create", "category")
                .actor(actor)
                .entity_id(created.id),
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: u32,
        request: CategoryRequest,
    ) -> Result<CategoryRecord, AppError> {
        request.validate()?;
        let before = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Category not found"))?;

        let mut after = before.clone();
        after.name = request.name.trim().to_string();
        if let Some(slug) = request.slug.as_deref() {
            after.slug = resolve_slug(Some(slug), &after.name).map_err(slug_error)?;
        }
        if request.description.is_some() {
            after.description = optional_text(request.description);
        }
        if let Some(sort_order) = request.sort_order {
            after.sort_order = sort_order;
        }
        if let Some(active) = request.active {
            after.active = active;
        }
        after.updated_at = OffsetDateTime::now_utc();

        let saved = self.repo.update(&after).await.map_err(Self::repo_error)?;
        self.audit.log_async(
            AuditEntry::new("category.update", "category")
                .actor(actor)
                .entity_id(id)
                .changes(diff_fields(&before, &saved)),
        );
        Ok(saved)
    }

    pub async fn delete(&self, actor: &Actor, id: u32) -> Result<(), AppError> {
        self.repo.delete(id).await.map_err(Self::repo_error)?;
        self.audit.log_async(
            AuditEntry::new("category.delete", "category")
                .actor(actor)
                .entity_id(id),
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuthorService {
    repo: Arc<dyn AuthorsRepo>,
    audit: AuditSink,
}

impl AuthorService {
    pub fn new(repo: Arc<dyn AuthorsRepo>, audit: AuditSink) -> Self {
        Self { repo, audit }
    }

    fn repo_error(err: RepoError) -> AppError {
        match err {
            RepoError::NotFound => AppError::not_found("Author not found"),
            RepoError::Duplicate { .. } => {
                AppError::DuplicateSlug("An author with this slug already exists".to_string())
            }
            other => other.into(),
        }
    }

    pub async fn list(
        &self,
        search: Option<&str>,
        include_inactive: bool,
        page: PageRequest,
    ) -> Result<Paginated<AuthorRecord>, AppError> {
        let search = search.map(str::trim).filter(|value| !value.is_empty());
        Ok(self.repo.list(search, include_inactive, page).await?)
    }

    pub async fn get(&self, reference: &str, include_inactive: bool) -> Result<AuthorRecord, AppError> {
        let found = match parse_reference(reference) {
            Ok(id) => self.repo.find_by_id(id).await?,
            Err(slug) => self.repo.find_by_slug(slug).await?,
        };
        match found {
            Some(author) if author.active || include_inactive => Ok(author),
            _ => Err(AppError::not_found("Author not found")),
        }
    }

    pub async fn create(&self, actor: &Actor, request: AuthorRequest) -> Result<AuthorRecord, AppError> {
        request.validate()?;
        let slug = resolve_slug(request.slug.as_deref(), &request.name).map_err(slug_error)?;
        let created = self
            .repo
            .create(&NewAuthor {
                slug,
                name: request.name.trim().to_string(),
                bio: optional_text(request.bio),
                avatar_url: optional_text(request.avatar_url),
                email: optional_text(request.email),
                active: request.active.unwrap_or(true),
            })
            .await
            .map_err(Self::repo_error)?;

        self.audit.log_async(
            AuditEntry::new("author.create", "author")
                .actor(actor)
                .entity_id(created.id),
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: u32,
        request: AuthorRequest,
    ) -> Result<AuthorRecord, AppError> {
        request.validate()?;
        let before = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Author not found"))?;

        let mut after = before.clone();
        after.name = request.name.trim().to_string();
        if let Some(slug) = request.slug.as_deref() {
            after.slug = resolve_slug(Some(slug), &after.name).map_err(slug_error)?;
        }
        if request.bio.is_some() {
            after.bio = optional_text(request.bio);
        }
        if request.avatar_url.is_some() {
            after.avatar_url = optional_text(request.avatar_url);
        }
        if request.email.is_some() {
            after.email = optional_text(request.email);
        }
        if let Some(active) = request.active {
            after.active = active;
        }
        after.updated_at = OffsetDateTime::now_utc();

        let saved = self.repo.update(&after).await.map_err(Self::repo_error)?;
        self.audit.log_async(
            AuditEntry::new("author.update", "author")
                .actor(actor)
                .entity_id(id)
                .changes(diff_fields(&before, &saved)),
        );
        Ok(saved)
    }

    pub async fn delete(&self, actor: &Actor, id: u32) -> Result<(), AppError> {
        self.repo.delete(id).await.map_err(Self::repo_error)?;
        self.audit.log_async(
            AuditEntry::new("author.delete", "author")
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
    fn references_split_into_ids_and_slugs() {
        assert_eq!(parse_reference("42"), Ok(42));
        assert_eq!(parse_reference("jane-doe"), Err("jane-doe"));
        assert_eq!(parse_reference("-1"), Err("-1"));
    }

    #[test]
    fn blank_optional_text_is_dropped() {
        assert_eq!(optional_text(Some("  ".to_string())), None);
        assert_eq!(optional_text(Some(" Bio ".to_string())), Some("Bio".to_string()));
    }
}
