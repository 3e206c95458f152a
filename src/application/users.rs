//! Staff account administration.

use std::sync::Arc;

use marketlens_api_types::{UserCreateRequest, UserUpdateRequest};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::application::{
    audit::AuditSink,
    auth::{PasswordError, PasswordHasher, SessionStore},
    context::Actor,
    error::AppError,
    pagination::{PageRequest, Paginated},
    repos::{AuditEntry, NewPrincipal, PrincipalFilter, PrincipalsRepo, RepoError},
};
use crate::domain::{
    content::diff_fields,
    entities::{FieldChange, PrincipalRecord},
    types::Role,
    validation::Validate,
};

const TARGET: &str = "marketlens::users";

fn password_error(err: PasswordError) -> AppError {
    match err {
        PasswordError::TooShort { .. } => AppError::bad_request(err.to_string()),
        other => AppError::internal(other.to_string()),
    }
}

fn repo_error(err: RepoError) -> AppError {
    match err {
        RepoError::Duplicate { .. } => {
            AppError::DuplicateSlug("A user with this email already exists".to_string())
        }
        RepoError::NotFound => AppError::not_found("User not found"),
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn PrincipalsRepo>,
    hasher: PasswordHasher,
    sessions: SessionStore,
    audit: AuditSink,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn PrincipalsRepo>,
        hasher: PasswordHasher,
        sessions: SessionStore,
        audit: AuditSink,
    ) -> Self {
        Self {
            repo,
            hasher,
            sessions,
            audit,
        }
    }

    pub async fn get(&self, id: u32) -> Result<PrincipalRecord, AppError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn list(
        &self,
        filter: &PrincipalFilter,
        page: PageRequest,
    ) -> Result<Paginated<PrincipalRecord>, AppError> {
        Ok(self.repo.list(filter, page).await?)
    }

    pub async fn by_role(
        &self,
        role: Role,
        page: PageRequest,
    ) -> Result<Paginated<PrincipalRecord>, AppError> {
        let filter = PrincipalFilter {
            role: Some(role),
            active: Some(true),
            search: None,
        };
        self.list(&filter, page).await
    }

    pub async fn create(
        &self,
        actor: &Actor,
        request: UserCreateRequest,
    ) -> Result<PrincipalRecord, AppError> {
        request.validate()?;
        let email = request.email.trim().to_string();
        if self.repo.find_by_email(&email).await?.is_some() {
            return Err(repo_error(RepoError::Duplicate {
                constraint: "users_email_key".to_string(),
            }));
        }

        let password_hash = self
            .hasher
            .hash(&request.password)
            .await
            .map_err(password_error)?;
        let created = self
            .repo
            .create(&NewPrincipal {
                email,
                password_hash,
                name: request.name.trim().to_string(),
                role: request.role,
            })
            .await
            .map_err(repo_error)?;

        info!(target: TARGET, id = created.id, role = %created.role, "user created");
        self.audit.log_async(
            AuditEntry::new("user.create", "user")
                .actor(actor)
                .entity_id(created.id),
        );
        Ok(created)
    }

    /// Apply a partial update. Deactivation or a password change revokes every session.
    pub async fn update(
        &self,
        actor: &Actor,
        id: u32,
        request: UserUpdateRequest,
    ) -> Result<PrincipalRecord, AppError> {
        request.validate()?;
        let before = self.get(id).await?;
        let mut after = before.clone();

        if let Some(email) = request.email {
            let email = email.trim().to_string();
            if !email.eq_ignore_ascii_case(&before.email)
                && self.repo.find_by_email(&email).await?.is_some()
            {
                return Err(repo_error(RepoError::Duplicate {
                    constraint: "users_email_key".to_string(),
                }));
            }
            after.email = email;
        }
        if let Some(name) = request.name {
            after.name = name.trim().to_string();
        }
        if let Some(role) = request.role {
            after.role = role;
        }
        if let Some(active) = request.active {
            after.active = active;
        }
        let password_changed = request.password.is_some();
        if let Some(password) = request.password {
            after.password_hash = self.hasher.hash(&password).await.map_err(password_error)?;
        }
        after.updated_at = OffsetDateTime::now_utc();

        let saved = self.repo.update(&after).await.map_err(repo_error)?;
        if (before.active && !saved.active) || password_changed {
            let revoked = self.sessions.revoke_all(id).await;
            info!(target: TARGET, id, revoked, "user sessions revoked");
        }

        let mut changes = diff_fields(&before, &saved);
        if password_changed {
            changes.insert(
                "password".to_string(),
                FieldChange {
                    old: Value::from("[redacted]"),
                    new: Value::from("[redacted]"),
                },
            );
        }
        self.audit.log_async(
            AuditEntry::new("user.update", "user")
                .actor(actor)
                .entity_id(id)
                .changes(changes),
        );
        Ok(saved)
    }

    /// Accounts are deactivated rather than removed so audit history keeps its subject.
    pub async fn deactivate(&self, actor: &Actor, id: u32) -> Result<(), AppError> {
        if actor.id() == id {
            return Err(AppError::bad_request("You cannot deactivate your own account"));
        }
        let mut record = self.get(id).await?;
        record.active = false;
        record.updated_at = OffsetDateTime::now_utc();
        self.repo.update(&record).await.map_err(repo_error)?;
        self.sessions.revoke_all(id).await;

        self.audit
            .log(
                AuditEntry::new("user.deactivate", "user")
                    .actor(actor)
                    .entity_id(id),
            )
            .await
            .map_err(|err| {
                error!(target: TARGET, id, error = %err, "deactivation audit record not persisted");
                AppError::from(err)
            })?;
        Ok(())
    }
}
