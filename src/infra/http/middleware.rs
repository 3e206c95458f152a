use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use metrics::histogram;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::{context::Principal, error::ErrorReport};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;
const METRIC_REQUEST_MS: &str = "marketlens_http_request_ms";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

fn inbound_request_id(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
}

/// Propagate a caller-supplied `x-request-id` or mint one, and echo it on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = inbound_request_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Failure details pulled off a response for the access log.
struct FailureLog {
    source: &'static str,
    detail: String,
    chain: Vec<String>,
    principal_id: Option<u32>,
}

impl FailureLog {
    fn take(response: &mut Response) -> Self {
        let principal_id = response
            .extensions()
            .get::<Principal>()
            .map(|principal| principal.id);
        let (source, chain) = response
            .extensions_mut()
            .remove::<ErrorReport>()
            .map(|report| (report.source, report.messages))
            .unwrap_or(("unknown", Vec::new()));
        let detail = chain
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());
        Self {
            source,
            detail,
            chain,
            principal_id,
        }
    }
}

/// Record latency for every response; 4xx are logged at `warn`, 5xx at `error`.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();
    histogram!(METRIC_REQUEST_MS, "status" => status.as_u16().to_string())
        .record(elapsed.as_secs_f64() * 1000.0);

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let failure = FailureLog::take(&mut response);
    macro_rules! emit {
        ($level:ident, $message:literal) => {
            $level!(
                target: "marketlens::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed.as_millis() as u64,
                source = failure.source,
                detail = %failure.detail,
                chain = ?failure.chain,
                request_id = %request_id,
                principal_id = ?failure.principal_id,
                $message,
            )
        };
    }
    if status.is_server_error() {
        emit!(error, "request failed");
    } else {
        emit!(warn, "client request error");
    }

    response
}
