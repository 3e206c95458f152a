//! HS256 bearer tokens. Access and refresh tokens share one claim set and differ only in
//! `kind` and lifetime.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::context::Principal;
use crate::domain::types::Role;

/// Seconds of clock skew tolerated on `nbf`/`exp`.
const LEEWAY_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub uid: u32,
    pub email: String,
    pub role: Role,
    pub kind: TokenKind,
    pub iss: String,
    pub nbf: i64,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token is a {actual:?} token, expected {expected:?}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(15 * 60),
            refresh: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Clone)]
pub struct TokenMinter {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    lifetimes: TokenLifetimes,
}

impl TokenMinter {
    pub fn new(secret: &[u8], issuer: impl Into<String>, lifetimes: TokenLifetimes) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    pub fn mint(
        &self,
        principal: &Principal,
        kind: TokenKind,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, TokenError> {
        let lifetime = match kind {
            TokenKind::Access => self.lifetimes.access,
            TokenKind::Refresh => self.lifetimes.refresh,
        };
        let issued_at = now.unix_timestamp();
        let expires_at =
            issued_at.saturating_add(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX));

        let claims = Claims {
            sub: principal.id.to_string(),
            uid: principal.id,
            email: principal.email.clone(),
            role: principal.role,
            kind,
            iss: self.issuer.clone(),
            nbf: issued_at,
            iat: issued_at,
            exp: expires_at,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))?;
        Ok(IssuedToken { token, claims })
    }

    pub fn mint_pair(
        &self,
        principal: &Principal,
        now: OffsetDateTime,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.mint(principal, TokenKind::Access, now)?,
            refresh: self.mint(principal, TokenKind::Refresh, now)?,
        })
    }

    /// Check signature, issuer, validity window and kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = LEEWAY_SECS;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err.to_string()),
            }
        })?;

        if data.claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: data.claims.kind,
            });
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use time::Duration as TimeDuration;

    use super::*;

    const SECRET: &[u8] = b"test-secret-that-is-at-least-32-bytes-long";

    fn minter() -> TokenMinter {
        TokenMinter::new(SECRET, "marketlens", TokenLifetimes::default())
    }

    fn principal() -> Principal {
        Principal {
            id: 7,
            email: "editor@example.com".into(),
            name: "Editor".into(),
            role: Role::Editor,
        }
    }

    #[test]
    fn pair_carries_identity_and_distinct_ids() {
        let pair = minter()
            .mint_pair(&principal(), OffsetDateTime::now_utc())
            .expect("mint");
        assert_ne!(pair.access.claims.jti, pair.refresh.claims.jti);
        assert_eq!(pair.access.claims.exp - pair.access.claims.iat, 900);

        let claims = minter()
            .verify(&pair.refresh.token, TokenKind::Refresh)
            .expect("verify");
        assert_eq!(claims.uid, 7);
        assert_eq!(claims.role, Role::Editor);
        assert_eq!(claims.iss, "marketlens");
    }

    #[test]
    fn kind_is_enforced() {
        let access = minter()
            .mint(&principal(), TokenKind::Access, OffsetDateTime::now_utc())
            .expect("mint");
        assert_eq!(
            minter().verify(&access.token, TokenKind::Refresh),
            Err(TokenError::WrongKind {
                expected: TokenKind::Refresh,
                actual: TokenKind::Access,
            })
        );
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issued = OffsetDateTime::now_utc() - TimeDuration::hours(1);
        let access = minter()
            .mint(&principal(), TokenKind::Access, issued)
            .expect("mint");
        assert_eq!(
            minter().verify(&access.token, TokenKind::Access),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn foreign_signatures_and_issuers_are_rejected() {
        let now = OffsetDateTime::now_utc();
        let other = TokenMinter::new(
            b"another-secret-that-is-32-bytes-long!!",
            "marketlens",
            TokenLifetimes::default(),
        );
        let forged = other
            .mint(&principal(), TokenKind::Access, now)
            .expect("mint");
        assert!(matches!(
            minter().verify(&forged.token, TokenKind::Access),
            Err(TokenError::Invalid(_))
        ));

        let elsewhere = TokenMinter::new(SECRET, "elsewhere", TokenLifetimes::default());
        let token = elsewhere
            .mint(&principal(), TokenKind::Access, now)
            .expect("mint");
        assert!(matches!(
            minter().verify(&token.token, TokenKind::Access),
            Err(TokenError::Invalid(_))
        ));
    }
}
