//! HTTP adapter: the JSON API router, its guards and the cross-cutting request middleware.

pub mod api;
mod middleware;

pub use api::{API_PREFIX, ApiState, Backends, SecurityConfig, build_router};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
