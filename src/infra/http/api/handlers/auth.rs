use axum::{extract::State, response::Response};
use bytes::Bytes;
use marketlens_api_types::{LoginRequest, LogoutRequest, RefreshRequest};

use crate::application::error::AppError;
use crate::infra::http::api::{
    extract::{ApiJson, Authenticated, Caller},
    response,
    state::ApiState,
};

pub async fn login(
    State(state): State<ApiState>,
    caller: Caller,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Response, AppError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }
    let tokens = state
        .auth
        .login(&request.email, &request.password, &caller.meta)
        .await?;
    Ok(response::ok(tokens))
}

pub async fn refresh(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Response, AppError> {
    let tokens = state.auth.refresh(&request.refresh_token).await?;
    Ok(response::ok(tokens))
}

/// The body is optional; when present it may name the refresh token to revoke.
pub async fn logout(
    State(state): State<ApiState>,
    Authenticated(actor): Authenticated,
    body: Bytes,
) -> Result<Response, AppError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        LogoutRequest::default()
    } else {
        serde_json::from_slice::<LogoutRequest>(&body)
            .map_err(|err| AppError::bad_request(format!("Invalid request body: {err}")))?
    };

    state
        .auth
        .logout(&actor, request.refresh_token.as_deref())
        .await?;
    Ok(response::message("Logged out"))
}
