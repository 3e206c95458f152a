//! MarketLens cache layer.
//!
//! A typed JSON facade ([`Cache`]) over a remote key/value store ([`KvStore`]). Every
//! operation is best-effort: store failures are logged and absorbed so that a cache
//! outage degrades latency, never correctness.
//!
//! - `get_or_compute` is the stampede-safe read-through built on [`SingleFlight`].
//! - `delete_by_prefix` purges derived entries with batched `SCAN`s.

mod client;
mod config;
mod flight;
pub mod keys;
mod store;

use thiserror::Error;

pub use client::Cache;
pub use config::CacheConfig;
pub use flight::SingleFlight;
pub use store::{KvStore, MemoryStore, RedisStore};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache codec error: {0}")]
    Codec(String),
}

impl CacheError {
    pub(crate) fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}
