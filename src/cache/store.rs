//! Raw key/value backends behind the typed cache facade.

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::time::Instant;
use tracing::warn;

use super::CacheError;

const TARGET: &str = "marketlens::cache::store";

/// The subset of Redis semantics the cache relies on.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, CacheError>;
    /// One `SCAN` round. A returned cursor of `0` ends the iteration.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError>;
    async fn incr(&self, key: &str) -> Result<u64, CacheError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;
    /// Remaining lifetime, `None` when the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Redis-backed store sharing one auto-reconnecting multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(CacheError::unavailable)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(CacheError::unavailable)?;
        Ok(Self { manager })
    }
}

fn whole_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(CacheError::unavailable)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, value, whole_seconds(ttl))
            .await
            .map_err(CacheError::unavailable)?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let removed: u64 = conn.del(keys).await.map_err(CacheError::unavailable)?;
        Ok(removed)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        let mut conn = self.manager.clone();
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::unavailable)?;
        Ok((next, keys))
    }

    async fn incr(&self, key: &str) -> Result<u64, CacheError> {
        let mut conn = self.manager.clone();
        let value: u64 = conn.incr(key, 1u64).await.map_err(CacheError::unavailable)?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let seconds = i64::try_from(whole_seconds(ttl)).unwrap_or(i64::MAX);
        let _: () = conn
            .expire(key, seconds)
            .await
            .map_err(CacheError::unavailable)?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.manager.clone();
        let seconds: i64 = conn.ttl(key).await.map_err(CacheError::unavailable)?;
        Ok(u64::try_from(seconds).ok().map(Duration::from_secs))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::unavailable)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Process-local store for single-node deployments and tests. Expiry follows
/// `tokio::time`, so paused test clocks drive it.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries("len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self, op: &'static str) -> MutexGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!(target: TARGET, op, "recovered poisoned memory store lock");
            poisoned.into_inner()
        })
    }

    fn ensure_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("memory store offline".to_string()))
        }
    }

    fn live_entry(entries: &mut HashMap<String, MemoryEntry>, key: &str) -> Option<MemoryEntry> {
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.ensure_available()?;
        let mut entries = self.entries("get");
        Ok(Self::live_entry(&mut entries, key).map(|entry| entry.value))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_available()?;
        let mut entries = self.entries("set_ex");
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        self.ensure_available()?;
        let mut entries = self.entries("del");
        let removed = keys
            .iter()
            .filter(|key| entries.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        self.ensure_available()?;
        let now = Instant::now();
        let entries = self.entries("scan");
        let mut keys: Vec<&String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key)
            .collect();
        keys.sort();

        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let end = start.saturating_add(count.max(1)).min(keys.len());
        let batch = keys
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .filter(|key| glob_match(pattern, key))
            .map(|key| (*key).clone())
            .collect();
        let next = if end >= keys.len() { 0 } else { end as u64 };
        Ok((next, batch))
    }

    async fn incr(&self, key: &str) -> Result<u64, CacheError> {
        self.ensure_available()?;
        let mut entries = self.entries("incr");
        let existing = Self::live_entry(&mut entries, key);
        let current = match existing.as_ref() {
            Some(entry) => entry
                .value
                .parse::<u64>()
                .map_err(|err| CacheError::Codec(format!("value at `{key}` is not a counter: {err}")))?,
            None => 0,
        };
        let next = current + 1;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: next.to_string(),
                expires_at: existing.and_then(|entry| entry.expires_at),
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_available()?;
        let mut entries = self.entries("expire");
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.ensure_available()?;
        let mut entries = self.entries("ttl");
        let now = Instant::now();
        Ok(Self::live_entry(&mut entries, key)
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.ensure_available()
    }
}

/// Redis-style glob supporting `*` and `?`.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let (mut p, mut c) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = c;
            p += 1;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            resume += 1;
            c = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_prefix_patterns() {
        assert!(glob_match("reports:list:*", "reports:list:abc"));
        assert!(glob_match("reports:*:1?", "reports:id:12"));
        assert!(!glob_match("reports:list:*", "blogs:list:abc"));
        assert!(!glob_match("reports:id:1", "reports:id:12"));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_with_the_tokio_clock() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_secs(10))
            .await
            .expect("set");
        assert_eq!(store.get("k").await.expect("get"), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn scan_walks_all_keys_in_batches() {
        let store = MemoryStore::new();
        for index in 0..250 {
            store
                .set_ex(&format!("reports:list:{index}"), "x", Duration::from_secs(60))
                .await
                .expect("set");
        }
        store
            .set_ex("blogs:list:1", "x", Duration::from_secs(60))
            .await
            .expect("set");

        let mut cursor = 0;
        let mut seen = 0;
        loop {
            let (next, keys) = store.scan(cursor, "reports:list:*", 100).await.expect("scan");
            seen += keys.len();
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen, 250);
    }

    #[tokio::test]
    async fn incr_preserves_expiry_and_reports_outage() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("hits").await.expect("incr"), 1);
        store
            .expire("hits", Duration::from_secs(30))
            .await
            .expect("expire");
        assert_eq!(store.incr("hits").await.expect("incr"), 2);
        assert!(store.ttl("hits").await.expect("ttl").is_some());

        store.set_available(false);
        assert!(store.get("hits").await.is_err());
    }
}
