//! `CacheStore`: the shared key-value store backing sticky sessions,
//! per-provider failure counters, and per-key QPS buckets (C1 KeyedCache).
//!
//! Grounded on the teacher's `core::traits::cache::Cache<K, V>` trait shape
//! (async trait, default-method-light), narrowed to the five operations
//! the gateway actually needs: `get`, `set`, `delete`, `incr`, `expire`.
//! Values are opaque UTF-8 bytes, exactly as required externally.

use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value by key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, optionally with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically increment an integer counter stored at `key`, returning
    /// the new value. Creates the counter at 1 if absent.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Set (or reset) the TTL on an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Convenience: read a key as an integer, treating absence as `None`
    /// rather than an error (used by failure-counter reads that tolerate
    /// staleness per the concurrency model).
    async fn get_int(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get(key).await?.and_then(|v| v.parse::<i64>().ok()))
    }
}
