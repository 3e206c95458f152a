//! Per-request guards evaluated by the HTTP middleware before any handler runs.

pub mod csrf;
pub mod rate_limit;

pub use csrf::CsrfGuard;
pub use rate_limit::{RateDecision, RateLimiter, RatePolicy};
