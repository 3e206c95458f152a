//! Postgres-backed repository implementations.

mod attachments;
mod audit;
mod content;
mod dashboard;
mod principals;
mod submissions;
mod taxonomy;
mod util;

pub use util::map_sqlx_error;
use util::contains_pattern;

/// Appended after a bound `contains_pattern` value.
const LIKE_ESCAPE: &str = " ESCAPE '\\'";

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    migrate::MigrateError,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{HealthProbe, RepoError};
use crate::config::DatabaseSettings;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(settings.max_connections.get())
            .min_connections(settings.min_connections)
            .max_lifetime(settings.max_lifetime)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }
}

#[async_trait]
impl HealthProbe for PostgresRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

/// Ids are `SERIAL` columns; values beyond `i32` cannot exist in the table.
pub(crate) fn bind_id(id: u32) -> Result<i32, RepoError> {
    i32::try_from(id).map_err(|_| RepoError::NotFound)
}

pub(crate) fn row_id(id: i32) -> u32 {
    u32::try_from(id).unwrap_or_default()
}

pub(crate) fn opt_row_id(id: Option<i32>) -> Option<u32> {
    id.map(row_id)
}

pub(crate) fn opt_bind_id(id: Option<u32>) -> Option<i32> {
    id.and_then(|value| i32::try_from(value).ok())
}

pub(crate) fn to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}
