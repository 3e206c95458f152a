//! Request guards: rate limiting, CSRF verification and principal resolution.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::application::{
    error::AppError,
    guards::{CsrfGuard, RateDecision},
};

use super::state::ApiState;

const TARGET: &str = "marketlens::http::guards";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    raw.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn apply_rate_headers(response: &mut Response, decision: &RateDecision) {
    let headers = response.headers_mut();
    for (name, value) in [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at.to_string()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Fixed-window limit per client and path; the `X-RateLimit-*` headers ride on every response.
pub async fn rate_limit(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = state.client_resolver.resolve(request.headers(), peer);
    request.extensions_mut().insert(client.clone());
    let client = client.0;
    let path = request.uri().path().to_string();

    let decision = state.rate_limiter.check(&client, &path).await;
    let mut response = match decision.retry_after {
        Some(retry_after) => {
            debug!(target: TARGET, client = %client, path = %path, retry_after, "request rate limited");
            AppError::RateLimited { retry_after }.into_response()
        }
        None => next.run(request).await,
    };
    apply_rate_headers(&mut response, &decision);
    response
}

/// Double-submit check of the CSRF header against the CSRF cookie.
pub async fn csrf(State(state): State<ApiState>, request: Request<Body>, next: Next) -> Response {
    let has_bearer = bearer_token(request.headers()).is_some();
    if CsrfGuard::is_exempt(request.method(), request.uri().path(), has_bearer) {
        return next.run(request).await;
    }

    let settings = &state.csrf_settings;
    let header_value = request
        .headers()
        .get(settings.header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let jar = CookieJar::from_headers(request.headers());
    let cookie_value = jar
        .get(&settings.cookie_name)
        .map(|cookie| cookie.value().to_string());

    match state
        .csrf
        .validate(header_value.as_deref(), cookie_value.as_deref())
        .await
    {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

/// Resolve a bearer token into a `Principal` request extension. A presented but invalid
/// token is rejected outright; requests without one continue anonymously.
pub async fn resolve_principal(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return next.run(request).await;
    };

    let principal = match state.auth.authenticate(&token).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(principal.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok.en"));
        assert_eq!(bearer_token(&headers), Some("tok.en"));
    }
}
