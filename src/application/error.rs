use std::error::Error as StdError;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use marketlens_api_types::ApiResponse;
use thiserror::Error;

use crate::{
    application::repos::RepoError,
    cache::CacheError,
    domain::{error::DomainError, workflow::InvalidTransition},
    infra::error::InfraError,
};

/// Diagnostic attached to error responses for the response-logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Every failure the core can surface to a caller.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    DuplicateSlug(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Map a repository failure, naming the entity on not-found.
    pub fn from_repo(entity: &str, err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound(format!("{entity} not found")),
            RepoError::Duplicate { .. } => {
                Self::DuplicateSlug(format!("A {entity} with this slug already exists"))
            }
            other => other.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateSlug(_) => StatusCode::CONFLICT,
            AppError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message placed in the response envelope. Server-side detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(message)
            | AppError::Unauthorized(message)
            | AppError::Forbidden(message)
            | AppError::NotFound(message)
            | AppError::DuplicateSlug(message) => message.clone(),
            AppError::InvalidTransition(err) => err.to_string(),
            AppError::RateLimited { retry_after } => {
                format!("Too many requests, retry after {retry_after} seconds")
            }
            AppError::Storage(_) => "Failed to store data".to_string(),
            AppError::Upstream(_) => "Upstream service unavailable".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity } => Self::NotFound(format!("{entity} not found")),
            DomainError::Validation { message } => Self::BadRequest(message),
            DomainError::InvalidTransition(err) => Self::InvalidTransition(err),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound("Resource not found".to_string()),
            RepoError::Duplicate { constraint } => {
                Self::DuplicateSlug(format!("Duplicate record ({constraint})"))
            }
            RepoError::InvalidInput { message } => Self::BadRequest(message),
            RepoError::Integrity { message } => Self::BadRequest(message),
            RepoError::Timeout => Self::Internal("database timeout".to_string()),
            RepoError::Persistence(message) => Self::Internal(message),
        }
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<InfraError> for AppError {
    fn from(err: InfraError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiResponse::<()>::failure(self.public_message());
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited { retry_after } = &self
            && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{types::ContentStatus, workflow::Transition};

    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (AppError::bad_request("x"), StatusCode::BAD_REQUEST),
            (AppError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (AppError::forbidden("x"), StatusCode::FORBIDDEN),
            (AppError::not_found("x"), StatusCode::NOT_FOUND),
            (AppError::DuplicateSlug("x".into()), StatusCode::CONFLICT),
            (
                AppError::RateLimited { retry_after: 3 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AppError::storage("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::upstream("x"), StatusCode::BAD_GATEWAY),
            (AppError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error:?}");
        }
    }

    #[test]
    fn invalid_transition_is_a_bad_request_naming_both_states() {
        let err: AppError = Transition::Approve
            .apply(ContentStatus::Draft)
            .expect_err("draft cannot be approved")
            .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let message = err.public_message();
        assert!(message.contains("draft"));
        assert!(message.contains("pending_review"));
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = AppError::from(RepoError::Persistence("relation missing".into()));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = AppError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("42")
        );
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
