//! Editorial dashboard read models.

use std::sync::Arc;

use serde::Serialize;

use crate::application::{
    audit::AuditService,
    error::AppError,
    repos::DashboardRepo,
};
use crate::domain::entities::{AuditRecord, DashboardStats};

pub const DEFAULT_ACTIVITY_LIMIT: i64 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub entries: Vec<AuditRecord>,
}

#[derive(Clone)]
pub struct DashboardService {
    repo: Arc<dyn DashboardRepo>,
    audit: AuditService,
}

impl DashboardService {
    pub fn new(repo: Arc<dyn DashboardRepo>, audit: AuditService) -> Self {
        Self { repo, audit }
    }

    pub async fn stats(&self) -> Result<DashboardStats, AppError> {
        Ok(self.repo.dashboard_stats().await?)
    }

    /// Most recent audit entries, newest first.
    pub async fn activity(&self, limit: Option<i64>) -> Result<Activity, AppError> {
        let entries = self
            .audit
            .recent(limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT))
            .await?;
        Ok(Activity { entries })
    }
}
