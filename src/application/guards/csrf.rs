//! Double-submit CSRF tokens backed by the cache.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::application::error::AppError;
use crate::cache::{Cache, keys};

const TARGET: &str = "marketlens::guards::csrf";
const TOKEN_BYTES: usize = 32;

pub const MISSING: &str = "CSRF token missing";
pub const MISMATCH: &str = "CSRF token mismatch";
pub const INVALID: &str = "CSRF token invalid or expired";

#[derive(Clone)]
pub struct CsrfGuard {
    cache: Cache,
    ttl: Duration,
}

impl CsrfGuard {
    pub fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Safe methods, bearer-authenticated calls and the credential endpoints skip the check.
    pub fn is_exempt(method: &axum::http::Method, path: &str, has_bearer: bool) -> bool {
        use axum::http::Method;

        if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) || has_bearer {
            return true;
        }
        let path = path.trim_end_matches('/');
        path.ends_with("/auth/login") || path.ends_with("/auth/refresh")
    }

    /// Mint a token and register it for `ttl`.
    pub async fn issue(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        if let Err(err) = self.cache.try_set(&keys::csrf(&token), &true, self.ttl).await {
            warn!(target: TARGET, error = %err, "failed to register csrf token");
        }
        token
    }

    pub async fn validate(&self, header: Option<&str>, cookie: Option<&str>) -> Result<(), AppError> {
        let (Some(header), Some(cookie)) = (
            header.filter(|value| !value.is_empty()),
            cookie.filter(|value| !value.is_empty()),
        ) else {
            return Err(AppError::forbidden(MISSING));
        };

        if header.as_bytes().ct_eq(cookie.as_bytes()).unwrap_u8() == 0 {
            return Err(AppError::forbidden(MISMATCH));
        }

        match self.cache.try_get::<bool>(&keys::csrf(header)).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(AppError::forbidden(INVALID)),
            Err(err) => {
                warn!(target: TARGET, error = %err, "csrf lookup failed; rejecting request");
                Err(AppError::forbidden(INVALID))
            }
        }
    }
}
