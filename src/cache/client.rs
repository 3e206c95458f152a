use std::{future::Future, sync::Arc, time::Duration};

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{CacheConfig, CacheError, KvStore, MemoryStore, SingleFlight};

const TARGET: &str = "marketlens::cache";
const METRIC_HIT: &str = "marketlens_cache_hit_total";
const METRIC_MISS: &str = "marketlens_cache_miss_total";
const METRIC_ERROR: &str = "marketlens_cache_error_total";

/// Typed, failure-absorbing cache handle. Cheap to clone.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KvStore>,
    flights: Arc<SingleFlight>,
    config: CacheConfig,
}

impl Cache {
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self {
            store,
            flights: Arc::new(SingleFlight::new()),
            config,
        }
    }

    /// Process-local cache backed by [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    fn record_error(op: &'static str, key: &str, err: &CacheError) {
        counter!(METRIC_ERROR, "op" => op).increment(1);
        warn!(target: TARGET, op, key, error = %err, "cache operation failed; continuing without cache");
    }

    /// Store `value` under `key`, surfacing failures to the caller.
    pub async fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let encoded =
            serde_json::to_string(value).map_err(|err| CacheError::Codec(err.to_string()))?;
        self.store.set_ex(key, &encoded, ttl).await
    }

    /// Store `value` under `key`; failures are logged and swallowed.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(err) = self.try_set(key, value, ttl).await {
            Self::record_error("set", key, &err);
        }
    }

    /// Fetch and decode `key`. Entries that no longer decode are removed and reported as a miss.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.store.get(key).await? else {
            counter!(METRIC_MISS).increment(1);
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                counter!(METRIC_HIT).increment(1);
                Ok(Some(value))
            }
            Err(err) => {
                warn!(target: TARGET, key, error = %err, "discarding undecodable cache entry");
                if let Err(err) = self.store.del(&[key.to_string()]).await {
                    Self::record_error("del", key, &err);
                }
                counter!(METRIC_MISS).increment(1);
                Ok(None)
            }
        }
    }

    /// Fetch and decode `key`; store failures read as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(err) => {
                Self::record_error("get", key, &err);
                None
            }
        }
    }

    pub async fn try_delete(&self, key: &str) -> Result<bool, CacheError> {
        self.store
            .del(&[key.to_string()])
            .await
            .map(|removed| removed > 0)
    }

    pub async fn delete(&self, key: &str) {
        if let Err(err) = self.try_delete(key).await {
            Self::record_error("del", key, &err);
        }
    }

    /// Delete every key matching `pattern` (Redis glob syntax), scanning in batches.
    /// Keys inserted concurrently may survive. Returns the number of keys removed.
    pub async fn delete_by_prefix(&self, pattern: &str) -> u64 {
        let batch = self.config.scan_batch.max(1);
        let mut matched = Vec::new();
        let mut cursor = 0u64;
        loop {
            match self.store.scan(cursor, pattern, batch).await {
                Ok((next, keys)) => {
                    matched.extend(keys);
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Err(err) => {
                    Self::record_error("scan", pattern, &err);
                    break;
                }
            }
        }
        matched.sort_unstable();
        matched.dedup();

        let mut removed = 0u64;
        for chunk in matched.chunks(batch) {
            match self.store.del(chunk).await {
                Ok(count) => removed += count,
                Err(err) => {
                    Self::record_error("del", pattern, &err);
                    break;
                }
            }
        }

        debug!(target: TARGET, pattern, removed, "purged cache keys by pattern");
        removed
    }

    /// Stampede-safe read-through.
    ///
    /// On a miss, at most one `loader` runs per key in this process; concurrent callers
    /// wait for it and receive the same value, which is stored with `ttl` before anyone
    /// returns. Loader errors reach every waiter and are not cached. When the store
    /// itself is down the loader is called directly.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        match self.try_get::<T>(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(err) => {
                Self::record_error("get_or_compute", key, &err);
                return loader().await;
            }
        }

        let cache = self.clone();
        let owned_key = key.to_string();
        let work = loader();
        self.flights
            .run(key, async move {
                if let Ok(Some(value)) = cache.try_get::<T>(&owned_key).await {
                    return Ok(value);
                }
                let value = work.await?;
                cache.set(&owned_key, &value, ttl).await;
                Ok(value)
            })
            .await
    }

    /// Current value and remaining lifetime of a counter key.
    pub async fn counter(&self, key: &str) -> Result<(u64, Option<Duration>), CacheError> {
        let value = match self.store.get(key).await? {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|err| CacheError::Codec(format!("counter `{key}`: {err}")))?,
            None => 0,
        };
        let ttl = self.store.ttl(key).await?;
        Ok((value, ttl))
    }

    /// Increment a counter, arming `window` as its TTL on the first increment.
    pub async fn increment(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let value = self.store.incr(key).await?;
        if value == 1 {
            self.store.expire(key, window).await?;
        }
        Ok(value)
    }

    /// Arm (or re-arm) the TTL of an existing key.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.store.expire(key, ttl).await
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.store.ping().await
    }
}
