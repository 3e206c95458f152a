use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::{
    audit::AuditSink,
    context::{Actor, Principal, RequestMeta},
    error::AppError,
    repos::{AuditEntry, PrincipalsRepo},
};
use crate::domain::entities::PrincipalRecord;

use super::{
    password::{PasswordError, PasswordHasher},
    sessions::SessionStore,
    tokens::{TokenKind, TokenMinter, TokenPair},
};

const TARGET: &str = "marketlens::auth";
const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH: &str = "Invalid or expired refresh token";
const INVALID_ACCESS: &str = "Invalid or expired token";

/// Body returned by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: PrincipalRecord,
}

#[derive(Clone)]
pub struct AuthService {
    principals: Arc<dyn PrincipalsRepo>,
    hasher: PasswordHasher,
    tokens: TokenMinter,
    sessions: SessionStore,
    audit: AuditSink,
}

impl AuthService {
    pub fn new(
        principals: Arc<dyn PrincipalsRepo>,
        hasher: PasswordHasher,
        tokens: TokenMinter,
        sessions: SessionStore,
        audit: AuditSink,
    ) -> Self {
        Self {
            principals,
            hasher,
            tokens,
            sessions,
            audit,
        }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn login_failure(&self, meta: &RequestMeta, email: &str, principal_id: Option<u32>, reason: &str) {
        let mut entry = AuditEntry::new("auth.login", "user")
            .request(meta)
            .failure(reason);
        entry.principal_email = Some(email.to_string());
        entry.principal_id = principal_id;
        if let Some(id) = principal_id {
            entry = entry.entity_id(id);
        }
        self.audit.log_async(entry);
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<AuthTokens, AppError> {
        let email = email.trim();
        let Some(record) = self.principals.find_by_email(email).await? else {
            self.login_failure(meta, email, None, "unknown email");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        };

        if !record.active {
            self.login_failure(meta, email, Some(record.id), "account inactive");
            return Err(AppError::unauthorized("Account is inactive"));
        }

        match self.hasher.verify(&record.password_hash, password).await {
            Ok(()) => {}
            Err(PasswordError::Mismatch) => {
                self.login_failure(meta, email, Some(record.id), "password mismatch");
                return Err(AppError::unauthorized(INVALID_CREDENTIALS));
            }
            Err(err) => return Err(AppError::internal(err.to_string())),
        }

        let now = OffsetDateTime::now_utc();
        if let Err(err) = self.principals.record_login(record.id, now).await {
            warn!(target: TARGET, principal_id = record.id, error = %err, "failed to record last login");
        }

        let principal = Principal::from(&record);
        let pair = self.issue(&principal, now)?;
        self.sessions.register(&pair.refresh).await;

        let actor = Actor::new(principal, meta.clone());
        self.audit.log_async(
            AuditEntry::new("auth.login", "user")
                .actor(&actor)
                .entity_id(record.id),
        );
        info!(target: TARGET, principal_id = record.id, "login succeeded");

        let mut user = record;
        user.last_login_at = Some(now);
        Ok(self.respond(pair, user))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AppError> {
        let claims = self
            .tokens
            .verify(refresh_token, TokenKind::Refresh)
            .map_err(|_| AppError::unauthorized(INVALID_REFRESH))?;

        if !self.sessions.exists(claims.uid, &claims.jti).await {
            return Err(AppError::unauthorized(INVALID_REFRESH));
        }

        let record = match self.principals.find_by_id(claims.uid).await? {
            Some(record) if record.active => record,
            _ => return Err(AppError::unauthorized(INVALID_REFRESH)),
        };

        let principal = Principal::from(&record);
        let pair = self.issue(&principal, OffsetDateTime::now_utc())?;
        self.sessions.rotate(&pair.refresh, &claims.jti).await;

        Ok(self.respond(pair, record))
    }

    /// Revoke the presented refresh session. Unknown or foreign tokens are ignored.
    pub async fn logout(&self, actor: &Actor, refresh_token: Option<&str>) -> Result<(), AppError> {
        if let Some(token) = refresh_token
            && let Ok(claims) = self.tokens.verify(token, TokenKind::Refresh)
            && claims.uid == actor.id()
        {
            self.sessions.revoke(claims.uid, &claims.jti).await;
        }

        self.audit.log_async(
            AuditEntry::new("auth.logout", "user")
                .actor(actor)
                .entity_id(actor.id()),
        );
        Ok(())
    }

    /// Resolve an access token to an active principal.
    pub async fn authenticate(&self, access_token: &str) -> Result<Principal, AppError> {
        let claims = self
            .tokens
            .verify(access_token, TokenKind::Access)
            .map_err(|_| AppError::unauthorized(INVALID_ACCESS))?;

        match self.principals.find_by_id(claims.uid).await? {
            Some(record) if record.active => Ok(Principal::from(&record)),
            _ => Err(AppError::unauthorized(INVALID_ACCESS)),
        }
    }

    fn issue(&self, principal: &Principal, now: OffsetDateTime) -> Result<TokenPair, AppError> {
        self.tokens
            .mint_pair(principal, now)
            .map_err(|err| AppError::internal(err.to_string()))
    }

    fn respond(&self, pair: TokenPair, user: PrincipalRecord) -> AuthTokens {
        AuthTokens {
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
            token_type: "Bearer",
            expires_in: self.tokens.lifetimes().access.as_secs(),
            user,
        }
    }
}
