use std::{net::IpAddr, sync::Arc};

use crate::application::{
    attachments::{AttachmentService, ImageCdn},
    audit::{AuditService, AuditSink},
    auth::{AuthService, HashCost, PasswordHasher, SessionStore, TokenLifetimes, TokenMinter},
    content::WorkflowEngine,
    dashboard::DashboardService,
    guards::{CsrfGuard, RateLimiter, RatePolicy},
    health::HealthService,
    repos::{
        AttachmentsRepo, AuditRepo, AuthorsRepo, CategoriesRepo, ContentStore, DashboardRepo,
        HealthProbe, PrincipalsRepo, SubmissionsRepo, VersionsRepo,
    },
    submissions::SubmissionService,
    taxonomy::{AuthorService, CategoryService},
    users::UserService,
};
use crate::cache::Cache;
use crate::config::{CsrfSettings, Settings};
use crate::domain::entities::{BlogRecord, PressReleaseRecord, ReportRecord};
use crate::infra::{db::PostgresRepositories, error::InfraError};

use super::extract::ClientResolver;

const MIN_SECRET_BYTES: usize = 32;

/// Every persistence and upstream port the HTTP surface depends on.
#[derive(Clone)]
pub struct Backends {
    pub reports: Arc<dyn ContentStore<ReportRecord>>,
    pub blogs: Arc<dyn ContentStore<BlogRecord>>,
    pub press_releases: Arc<dyn ContentStore<PressReleaseRecord>>,
    pub versions: Arc<dyn VersionsRepo>,
    pub principals: Arc<dyn PrincipalsRepo>,
    pub categories: Arc<dyn CategoriesRepo>,
    pub authors: Arc<dyn AuthorsRepo>,
    pub submissions: Arc<dyn SubmissionsRepo>,
    pub attachments: Arc<dyn AttachmentsRepo>,
    pub audit: Arc<dyn AuditRepo>,
    pub dashboard: Arc<dyn DashboardRepo>,
    pub health: Arc<dyn HealthProbe>,
    pub cdn: Arc<dyn ImageCdn>,
}

impl Backends {
    pub fn postgres(repositories: Arc<PostgresRepositories>, cdn: Arc<dyn ImageCdn>) -> Self {
        Self {
            reports: repositories.clone(),
            blogs: repositories.clone(),
            press_releases: repositories.clone(),
            versions: repositories.clone(),
            principals: repositories.clone(),
            categories: repositories.clone(),
            authors: repositories.clone(),
            submissions: repositories.clone(),
            attachments: repositories.clone(),
            audit: repositories.clone(),
            dashboard: repositories.clone(),
            health: repositories,
            cdn,
        }
    }
}

/// Security knobs resolved from settings; tests construct it directly with cheap hashing.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub jwt_secret: Vec<u8>,
    pub issuer: String,
    pub lifetimes: TokenLifetimes,
    pub hash_cost: HashCost,
    pub general_rate: RatePolicy,
    pub login_rate: RatePolicy,
    pub trusted_proxies: Vec<IpAddr>,
    pub csrf: CsrfSettings,
}

impl SecurityConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, InfraError> {
        let secret = settings
            .auth
            .jwt_secret
            .as_deref()
            .ok_or_else(|| InfraError::configuration("auth.jwt_secret is not configured"))?;
        if secret.len() < MIN_SECRET_BYTES {
            return Err(InfraError::configuration(format!(
                "auth.jwt_secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }

        Ok(Self {
            jwt_secret: secret.as_bytes().to_vec(),
            issuer: settings.auth.issuer.clone(),
            lifetimes: TokenLifetimes {
                access: settings.auth.access_ttl,
                refresh: settings.auth.refresh_ttl,
            },
            hash_cost: HashCost {
                memory_kib: settings.auth.argon2_memory_kib,
                iterations: settings.auth.argon2_iterations,
                parallelism: settings.auth.argon2_parallelism,
            },
            general_rate: RatePolicy {
                window: settings.rate_limit.window,
                max_requests: settings.rate_limit.max_requests,
            },
            login_rate: RatePolicy {
                window: settings.rate_limit.login_window,
                max_requests: settings.rate_limit.login_max_attempts,
            },
            trusted_proxies: settings.rate_limit.trusted_proxies.clone(),
            csrf: settings.csrf.clone(),
        })
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub reports: Arc<WorkflowEngine<ReportRecord>>,
    pub blogs: Arc<WorkflowEngine<BlogRecord>>,
    pub press_releases: Arc<WorkflowEngine<PressReleaseRecord>>,
    pub attachments: Arc<AttachmentService>,
    pub categories: Arc<CategoryService>,
    pub authors: Arc<AuthorService>,
    pub submissions: Arc<SubmissionService>,
    pub audit: Arc<AuditService>,
    pub dashboard: Arc<DashboardService>,
    pub health: Arc<HealthService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub client_resolver: ClientResolver,
    pub csrf: Arc<CsrfGuard>,
    pub csrf_settings: Arc<CsrfSettings>,
}

impl ApiState {
    /// Wire every service over the given backends. The audit sink's worker is owned by the caller.
    pub fn new(
        backends: Backends,
        cache: Cache,
        audit: AuditSink,
        security: SecurityConfig,
    ) -> Result<Self, InfraError> {
        let hasher = PasswordHasher::new(security.hash_cost)
            .map_err(|err| InfraError::configuration(err.to_string()))?;
        let tokens = TokenMinter::new(&security.jwt_secret, security.issuer, security.lifetimes);
        let sessions = SessionStore::new(cache.clone(), security.lifetimes.refresh);

        let attachments = AttachmentService::new(
            backends.reports.clone(),
            backends.attachments,
            backends.cdn,
            audit.clone(),
        );
        let reports = WorkflowEngine::new(
            backends.reports,
            backends.versions.clone(),
            cache.clone(),
            audit.clone(),
        )
        .with_media(attachments.clone());
        let blogs = WorkflowEngine::new(
            backends.blogs,
            backends.versions.clone(),
            cache.clone(),
            audit.clone(),
        );
        let press_releases = WorkflowEngine::new(
            backends.press_releases,
            backends.versions,
            cache.clone(),
            audit.clone(),
        );
        let audit_service = AuditService::new(backends.audit);

        Ok(Self {
            auth: Arc::new(AuthService::new(
                backends.principals.clone(),
                hasher.clone(),
                tokens,
                sessions.clone(),
                audit.clone(),
            )),
            users: Arc::new(UserService::new(
                backends.principals,
                hasher,
                sessions,
                audit.clone(),
            )),
            reports: Arc::new(reports),
            blogs: Arc::new(blogs),
            press_releases: Arc::new(press_releases),
            attachments: Arc::new(attachments),
            categories: Arc::new(CategoryService::new(backends.categories, audit.clone())),
            authors: Arc::new(AuthorService::new(backends.authors, audit.clone())),
            submissions: Arc::new(SubmissionService::new(backends.submissions, audit)),
            dashboard: Arc::new(DashboardService::new(
                backends.dashboard,
                audit_service.clone(),
            )),
            audit: Arc::new(audit_service),
            health: Arc::new(HealthService::new(backends.health, cache.clone())),
            rate_limiter: Arc::new(RateLimiter::new(
                cache.clone(),
                security.general_rate,
                security.login_rate,
            )),
            client_resolver: ClientResolver::new(security.trusted_proxies),
            csrf: Arc::new(CsrfGuard::new(cache, security.csrf.token_ttl)),
            csrf_settings: Arc::new(security.csrf),
        })
    }
}
