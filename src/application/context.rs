//! Explicit per-request context handed from the HTTP adapter into services.

use serde::Serialize;

use crate::application::error::AppError;
use crate::domain::{
    entities::PrincipalRecord,
    roles::{Permission, roles_granting, sees_admin_fields},
    types::Role,
};

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: u32,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl Principal {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::forbidden("Insufficient permissions"))
        }
    }

    /// Forbidden unless the caller's role is one the catalogue grants `permission` to.
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        self.require_role(&roles_granting(permission))
    }

    /// Whether responses for this caller keep creator/updater ids and internal notes.
    pub fn is_privileged(&self) -> bool {
        sees_admin_fields(self.role)
    }
}

impl From<&PrincipalRecord> for Principal {
    fn from(record: &PrincipalRecord) -> Self {
        Self {
            id: record.id,
            email: record.email.clone(),
            name: record.name.clone(),
            role: record.role,
        }
    }
}

/// Transport facts recorded alongside audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

/// Who performs a mutation and through which request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub principal: Principal,
    pub meta: RequestMeta,
}

impl Actor {
    pub fn new(principal: Principal, meta: RequestMeta) -> Self {
        Self { principal, meta }
    }

    pub fn id(&self) -> u32 {
        self.principal.id
    }
}
