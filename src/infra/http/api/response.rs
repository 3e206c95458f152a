use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use marketlens_api_types::ApiResponse;
use serde::Serialize;

use crate::application::pagination::Paginated;

pub fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse::ok(data)).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::ok(data))).into_response()
}

pub fn paged<T: Serialize>(page: Paginated<T>) -> Response {
    let meta = page.meta();
    Json(ApiResponse::paged(page.items, meta)).into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Envelope without a payload for acknowledgements such as logout.
pub fn message(text: &str) -> Response {
    Json(ApiResponse::ok(serde_json::json!({ "message": text }))).into_response()
}
