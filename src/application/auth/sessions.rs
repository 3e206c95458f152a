//! Refresh-token registry kept in the cache under `session:{uid}:{jti}`.
//!
//! The registry is the only source of truth for revocation, so lookups fail closed: a
//! session the cache cannot confirm does not exist.

use std::time::Duration;

use tracing::warn;

use crate::cache::{Cache, keys};

use super::tokens::IssuedToken;

const TARGET: &str = "marketlens::auth::sessions";

#[derive(Clone)]
pub struct SessionStore {
    cache: Cache,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub async fn register(&self, refresh: &IssuedToken) {
        let key = keys::session(refresh.claims.uid, &refresh.claims.jti);
        if let Err(err) = self.cache.try_set(&key, &refresh.token, self.ttl).await {
            warn!(
                target: TARGET,
                principal_id = refresh.claims.uid,
                error = %err,
                "failed to register session; refresh will be refused"
            );
        }
    }

    pub async fn exists(&self, principal_id: u32, token_id: &str) -> bool {
        let key = keys::session(principal_id, token_id);
        match self.cache.try_get::<String>(&key).await {
            Ok(found) => found.is_some(),
            Err(err) => {
                warn!(
                    target: TARGET,
                    principal_id,
                    error = %err,
                    "session lookup failed; treating as revoked"
                );
                false
            }
        }
    }

    pub async fn revoke(&self, principal_id: u32, token_id: &str) {
        self.cache
            .delete(&keys::session(principal_id, token_id))
            .await;
    }

    /// Drop every session of a principal, e.g. after deactivation.
    pub async fn revoke_all(&self, principal_id: u32) -> u64 {
        self.cache
            .delete_by_prefix(&keys::sessions_of(principal_id))
            .await
    }

    /// Register the new session before revoking the old one.
    pub async fn rotate(&self, next: &IssuedToken, previous_id: &str) {
        self.register(next).await;
        self.revoke(next.claims.uid, previous_id).await;
    }
}
