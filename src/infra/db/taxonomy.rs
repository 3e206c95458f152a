use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{AuthorsRepo, CategoriesRepo, NewAuthor, NewCategory, RepoError},
    domain::entities::{AuthorRecord, CategoryRecord},
};

use super::{
    LIKE_ESCAPE, PostgresRepositories, bind_id, contains_pattern, map_sqlx_error, row_id, to_u64,
};

const CATEGORY_COLUMNS: &str =
    "id, slug, name, description, sort_order, active, created_at, updated_at";

const AUTHOR_COLUMNS: &str =
    "id, slug, name, bio, avatar_url, email, active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    slug: String,
    name: String,
    description: Option<String>,
    sort_order: i32,
    active: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row_id(row.id),
            slug: row.slug,
            name: row.name,
            description: row.description,
            sort_order: row.sort_order,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AuthorRow {
    id: i32,
    slug: String,
    name: String,
    bio: Option<String>,
    avatar_url: Option<String>,
    email: Option<String>,
    active: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<AuthorRow> for AuthorRecord {
    fn from(row: AuthorRow) -> Self {
        Self {
            id: row_id(row.id),
            slug: row.slug,
            name: row.name,
            bio: row.bio,
            avatar_url: row.avatar_url,
            email: row.email,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    async fn delete_from(&self, table: &str, id: u32) -> Result<(), RepoError> {
        let sql = format!("DELETE FROM {table} WHERE id = $1");
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
}

#[async_trait]
impl CategoriesRepo for PostgresRepositories {
    async fn list(&self, include_inactive: bool) -> Result<Vec<CategoryRecord>, RepoError> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories \
             WHERE active OR $1 ORDER BY sort_order ASC, name ASC"
        );
        let rows: Vec<CategoryRow> = sqlx::query_as(&sql)
            .bind(include_inactive)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(CategoryRecord::from).collect())
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<CategoryRecord>, RepoError> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1");
        let row: Option<CategoryRow> = sqlx::query_as(&sql)
            .bind(bind_id(id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(CategoryRecord::from))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CategoryRecord>, RepoError> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1");
        let row: Option<CategoryRow> = sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(CategoryRecord::from))
    }

    async fn create(&self, category: &NewCategory) -> Result<CategoryRecord, RepoError> {
        let sql = format!(
            "INSERT INTO categories (slug, name, description, sort_order, active) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {CATEGORY_COLUMNS}"
        );
        let row: CategoryRow = sqlx::query_as(&sql)
            .bind(category.slug.as_str())
            .bind(category.name.as_str())
            .bind(category.description.as_deref())
            .bind(category.sort_order)
            .bind(category.active)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(&self, category: &CategoryRecord) -> Result<CategoryRecord, RepoError> {
        let sql = format!(
            "UPDATE categories SET slug = $1, name = $2, description = $3, sort_order = $4, \
             active = $5, updated_at = now() WHERE id = $6 RETURNING {CATEGORY_COLUMNS}"
        );
        let row: Option<CategoryRow> = sqlx::query_as(&sql)
            .bind(category.slug.as_str())
            .bind(category.name.as_str())
            .bind(category.description.as_deref())
            .bind(category.sort_order)
            .bind(category.active)
            .bind(bind_id(category.id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(CategoryRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete(&self, id: u32) -> Result<(), RepoError> {
        self.delete_from("categories", id).await
    }
}

fn push_author_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    search: Option<&str>,
    include_inactive: bool,
) {
    qb.push(" WHERE 1=1");
    if !include_inactive {
        qb.push(" AND active");
    }
    if let Some(search) = search.map(str::trim)
        && !search.is_empty()
    {
        let pattern = contains_pattern(search);
        qb.push(" AND (name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(LIKE_ESCAPE);
        qb.push(" OR COALESCE(bio, '') ILIKE ");
        qb.push_bind(pattern);
        qb.push(LIKE_ESCAPE);
        qb.push(")");
    }
}

#[async_trait]
impl AuthorsRepo for PostgresRepositories {
    async fn list(
        &self,
        search: Option<&str>,
        include_inactive: bool,
        page: PageRequest,
    ) -> Result<Paginated<AuthorRecord>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM authors");
        push_author_filter(&mut count_qb, search, include_inactive);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!("SELECT {AUTHOR_COLUMNS} FROM authors"));
        push_author_filter(&mut qb, search, include_inactive);
        qb.push(" ORDER BY name ASC, id ASC LIMIT ");
        qb.push_bind(i64::from(page.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<AuthorRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(AuthorRecord::from).collect(),
            to_u64(total),
            page,
        ))
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<AuthorRecord>, RepoError> {
        let sql = format!("SELECT {AUTHOR_COLUMNS} FROM authors WHERE id = $1");
        let row: Option<AuthorRow> = sqlx::query_as(&sql)
            .bind(bind_id(id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(AuthorRecord::from))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<AuthorRecord>, RepoError> {
        let sql = format!("SELECT {AUTHOR_COLUMNS} FROM authors WHERE slug = $1");
        let row: Option<AuthorRow> = sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(AuthorRecord::from))
    }

    async fn create(&self, author: &NewAuthor) -> Result<AuthorRecord, RepoError> {
        let sql = format!(
            "INSERT INTO authors (slug, name, bio, avatar_url, email, active) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {AUTHOR_COLUMNS}"
        );
        let row: AuthorRow = sqlx::query_as(&sql)
            .bind(author.slug.as_str())
            .bind(author.name.as_str())
            .bind(author.bio.as_deref())
            .bind(author.avatar_url.as_deref())
            .bind(author.email.as_deref())
            .bind(author.active)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(&self, author: &AuthorRecord) -> Result<AuthorRecord, RepoError> {
        let sql = format!(
            "UPDATE authors SET slug = $1, name = $2, bio = $3, avatar_url = $4, email = $5, \
             active = $6, updated_at = now() WHERE id = $7 RETURNING {AUTHOR_COLUMNS}"
        );
        let row: Option<AuthorRow> = sqlx::query_as(&sql)
            .bind(author.slug.as_str())
            .bind(author.name.as_str())
            .bind(author.bio.as_deref())
            .bind(author.avatar_url.as_deref())
            .bind(author.email.as_deref())
            .bind(author.active)
            .bind(bind_id(author.id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(AuthorRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete(&self, id: u32) -> Result<(), RepoError> {
        self.delete_from("authors", id).await
    }
}
