//! Request extractors that surface rejections as the core error envelope.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Query, Request, rejection::JsonRejection},
    http::{HeaderMap, header, request::Parts},
};
use serde::de::DeserializeOwned;
use time::{Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};

use crate::application::{
    context::{Actor, Principal, RequestMeta},
    error::AppError,
};
use crate::domain::roles::Permission;
use crate::infra::http::middleware::{REQUEST_ID_HEADER, RequestContext};

/// JSON body whose parse failures become 400 responses.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            AppError::bad_request("Expected a JSON request body")
        }
        other => AppError::bad_request(format!("Invalid request body: {}", other.body_text())),
    }
}

/// Query string whose parse failures become 400 responses.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| {
                AppError::bad_request(format!("Invalid query: {}", rejection.body_text()))
            })
    }
}

/// The caller as resolved by the principal middleware; anonymous callers carry `None`.
#[derive(Debug, Clone)]
pub struct Caller {
    pub principal: Option<Principal>,
    pub meta: RequestMeta,
}

impl Caller {
    pub fn is_privileged(&self) -> bool {
        self.principal
            .as_ref()
            .is_some_and(Principal::is_privileged)
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            principal: parts.extensions.get::<Principal>().cloned(),
            meta: request_meta(parts),
        })
    }
}

/// An authenticated caller; anonymous requests are rejected with 401.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Actor);

impl Authenticated {
    pub fn require(self, permission: Permission) -> Result<Actor, AppError> {
        self.0.principal.require(permission)?;
        Ok(self.0)
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?;
        Ok(Self(Actor::new(principal, request_meta(parts))))
    }
}

fn request_meta(parts: &Parts) -> RequestMeta {
    let connect = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let request_id = parts
        .extensions
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .or_else(|| header_str(&parts.headers, REQUEST_ID_HEADER).map(str::to_string));

    let ip = parts
        .extensions
        .get::<ClientAddr>()
        .map(|ClientAddr(addr)| addr.clone())
        .or_else(|| connect.map(|addr| addr.ip().to_canonical().to_string()));

    RequestMeta {
        ip,
        user_agent: header_str(&parts.headers, header::USER_AGENT.as_str())
            .map(str::to_string),
        request_id,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// The resolved client address, stored as a request extension by the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

/// Picks the client address for a request. Forwarded headers are believed only when the
/// socket peer is a configured proxy; otherwise the peer itself is the client.
#[derive(Debug, Clone, Default)]
pub struct ClientResolver {
    trusted_proxies: Arc<[IpAddr]>,
}

impl ClientResolver {
    pub fn new(trusted_proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            trusted_proxies: trusted_proxies
                .into_iter()
                .map(|ip| ip.to_canonical())
                .collect(),
        }
    }

    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientAddr {
        let peer = peer.map(|addr| addr.ip().to_canonical());
        let forwarded = peer
            .filter(|ip| self.trusted_proxies.contains(ip))
            .and_then(|_| forwarded_client(headers));
        let addr = forwarded
            .or_else(|| peer.map(|ip| ip.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        ClientAddr(addr)
    }
}

/// First hop of `x-forwarded-for`, then `x-real-ip`. Only valid IP literals count.
fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .or_else(|| header_str(headers, "x-real-ip"))
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
        .map(|ip| ip.to_canonical().to_string())
}

pub fn parse_id(raw: &str) -> Result<u32, AppError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| AppError::bad_request(format!("Invalid id `{raw}`")))
}

/// RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(field: &str, raw: &str) -> Result<OffsetDateTime, AppError> {
    let raw = raw.trim();
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| AppError::bad_request(format!("Invalid date for `{field}`: {raw}")))
}

pub fn parse_optional_date(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<OffsetDateTime>, AppError> {
    raw.filter(|value| !value.trim().is_empty())
        .map(|value| parse_date(field, value))
        .transpose()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn ids_must_be_unsigned_integers() {
        assert_eq!(parse_id("42").expect("id"), 42);
        assert!(matches!(parse_id("abc"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_id("-1"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_id("4294967296"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn dates_accept_rfc3339_and_calendar_days() {
        assert_eq!(
            parse_date("from", "2024-03-01T10:00:00Z").expect("rfc3339"),
            datetime!(2024-03-01 10:00 UTC)
        );
        assert_eq!(
            parse_date("from", "2024-03-01").expect("day"),
            datetime!(2024-03-01 0:00 UTC)
        );
        assert!(parse_date("from", "03/01/2024").is_err());
        assert_eq!(parse_optional_date("from", Some("  ")).expect("blank"), None);
    }

    #[test]
    fn forwarded_headers_are_ignored_from_untrusted_peers() {
        let resolver = ClientResolver::default();
        let peer: SocketAddr = "10.0.0.9:4000".parse().expect("addr");
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5"));
        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.7"));

        assert_eq!(resolver.resolve(&headers, Some(peer)).0, "10.0.0.9");
        assert_eq!(resolver.resolve(&headers, None).0, "unknown");
    }

    #[test]
    fn trusted_proxies_forward_the_first_hop() {
        let proxy: SocketAddr = "10.0.0.9:4000".parse().expect("addr");
        let resolver = ClientResolver::new([proxy.ip()]);
        let mut headers = HeaderMap::new();
        assert_eq!(resolver.resolve(&headers, Some(proxy)).0, "10.0.0.9");

        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.7"));
        assert_eq!(resolver.resolve(&headers, Some(proxy)).0, "192.0.2.7");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(resolver.resolve(&headers, Some(proxy)).0, "203.0.113.5");

        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        headers.remove("x-real-ip");
        assert_eq!(resolver.resolve(&headers, Some(proxy)).0, "10.0.0.9");
    }

    #[test]
    fn ipv4_mapped_peers_match_ipv4_proxies() {
        let resolver = ClientResolver::new(["10.0.0.9".parse::<IpAddr>().expect("ip")]);
        let mapped: SocketAddr = "[::ffff:10.0.0.9]:4000".parse().expect("addr");
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5"));
        assert_eq!(resolver.resolve(&headers, Some(mapped)).0, "203.0.113.5");
    }
}
