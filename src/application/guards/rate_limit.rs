//! Fixed-window request counters keyed by client address and path.

use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use tracing::warn;

use crate::cache::{Cache, keys};

const TARGET: &str = "marketlens::guards::rate_limit";
const METRIC_REJECTED: &str = "marketlens_rate_limit_rejected_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub window: Duration,
    pub max_requests: u64,
}

/// Outcome of one check; feeds the `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp at which the current window closes.
    pub reset_at: i64,
    /// Set when the request must be rejected.
    pub retry_after: Option<u64>,
}

impl RateDecision {
    pub fn allowed(&self) -> bool {
        self.retry_after.is_none()
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: Cache,
    general: RatePolicy,
    login: RatePolicy,
}

fn whole_seconds_up(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

impl RateLimiter {
    pub fn new(cache: Cache, general: RatePolicy, login: RatePolicy) -> Self {
        Self {
            cache,
            general,
            login,
        }
    }

    pub fn policy_for(&self, path: &str) -> RatePolicy {
        if path.trim_end_matches('/').ends_with("/auth/login") {
            self.login
        } else {
            self.general
        }
    }

    pub async fn check(&self, client: &str, path: &str) -> RateDecision {
        let policy = self.policy_for(path);
        let key = keys::rate_limit(client, path);
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let window_secs = whole_seconds_up(policy.window);
        let open = RateDecision {
            limit: policy.max_requests,
            remaining: policy.max_requests,
            reset_at: now + window_secs as i64,
            retry_after: None,
        };

        let (current, mut ttl) = match self.cache.counter(&key).await {
            Ok(state) => state,
            Err(err) => {
                warn!(target: TARGET, key, error = %err, "rate limit store unavailable; allowing request");
                return open;
            }
        };

        // A counter without a TTL would never reset; an earlier expire must have been lost.
        if current > 0 && ttl.is_none() {
            match self.cache.expire(&key, policy.window).await {
                Ok(()) => {
                    warn!(target: TARGET, key, current, "re-armed rate limit window on orphaned counter");
                    ttl = Some(policy.window);
                }
                Err(err) => {
                    warn!(target: TARGET, key, error = %err, "rate limit window could not be armed; allowing request");
                    return open;
                }
            }
        }

        if current >= policy.max_requests {
            let retry_after = ttl.map(whole_seconds_up).unwrap_or(window_secs);
            counter!(METRIC_REJECTED).increment(1);
            return RateDecision {
                limit: policy.max_requests,
                remaining: 0,
                reset_at: now + retry_after as i64,
                retry_after: Some(retry_after),
            };
        }

        let count = match self.cache.increment(&key, policy.window).await {
            Ok(count) => count,
            Err(err) => {
                warn!(target: TARGET, key, error = %err, "rate limit increment failed; allowing request");
                return open;
            }
        };
        let reset_in = match ttl {
            Some(remaining) if current > 0 => whole_seconds_up(remaining),
            _ => window_secs,
        };

        RateDecision {
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(count),
            reset_at: now + reset_in as i64,
            retry_after: None,
        }
    }
}
