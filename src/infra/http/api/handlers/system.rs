use axum::{
    Json,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use marketlens_api_types::{ApiResponse, CsrfTokenResponse};
use time::Duration as CookieDuration;

use crate::application::error::AppError;
use crate::infra::http::api::{response, state::ApiState};

/// Database and cache checks; 503 with the same body when either is down.
pub async fn health(State(state): State<ApiState>) -> Response {
    let report = state.health.check().await;
    if report.is_healthy() {
        return response::ok(report);
    }
    let body = ApiResponse {
        success: false,
        data: Some(report),
        error: Some("Service unavailable".to_string()),
        meta: None,
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

/// Mint a CSRF token, set it as a cookie and echo it in the body and the configured header.
pub async fn csrf_token(State(state): State<ApiState>) -> Result<Response, AppError> {
    let settings = &state.csrf_settings;
    let token = state.csrf.issue().await;
    let max_age = i64::try_from(state.csrf.ttl().as_secs()).unwrap_or(i64::MAX);

    let cookie = Cookie::build((settings.cookie_name.clone(), token.clone()))
        .http_only(true)
        .secure(settings.secure_cookie)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(CookieDuration::seconds(max_age))
        .build();

    let mut response = response::ok(CsrfTokenResponse {
        csrf_token: token.clone(),
    });
    let headers = response.headers_mut();
    let cookie_value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|err| AppError::internal(format!("invalid csrf cookie: {err}")))?;
    headers.append(header::SET_COOKIE, cookie_value);
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(settings.header_name.as_str()),
        HeaderValue::from_str(&token),
    ) {
        headers.insert(name, value);
    }
    Ok(response)
}
