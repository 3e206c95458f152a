//! Cache configuration.

use std::time::Duration;

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_SCAN_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied to read-through content entries.
    pub default_ttl: Duration,
    /// Keys requested per `SCAN` round during prefix invalidation.
    pub scan_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            default_ttl: settings.default_ttl,
            scan_batch: settings.scan_batch.get(),
        }
    }
}
