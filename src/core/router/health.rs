//! C3 HealthOracle: derives a per-provider `HealthTag` from the same failure
//! cooldown counter the retry engine (C8) maintains in C1, so "down" means
//! exactly "currently in cooldown" with no separate health-check loop to run.

use super::types::HealthTag;
use crate::storage::CacheStore;
use std::sync::Arc;

pub struct HealthOracle {
    cache: Arc<dyn CacheStore>,
    failure_threshold: i64,
}

impl HealthOracle {
    pub fn new(cache: Arc<dyn CacheStore>, failure_threshold: u32) -> Self {
        Self {
            cache,
            failure_threshold: failure_threshold as i64,
        }
    }

    pub fn failure_cache_key(provider_id: &str) -> String {
        format!("provider:failure:{provider_id}")
    }

    /// A provider is `Down` once its failure counter reaches the configured
    /// threshold; otherwise `Healthy`. `Degraded` is left to the metrics
    /// store (elevated error rate short of full cooldown).
    pub async fn health_of(&self, provider_id: &str) -> HealthTag {
        match self.cache.get_int(&Self::failure_cache_key(provider_id)).await {
            Ok(Some(count)) if count >= self.failure_threshold => HealthTag::Down,
            Ok(_) => HealthTag::Healthy,
            Err(_) => HealthTag::Unknown,
        }
    }

    pub async fn health_table(
        &self,
        provider_ids: &[String],
    ) -> std::collections::HashMap<String, HealthTag> {
        let mut out = std::collections::HashMap::new();
        for id in provider_ids {
            out.insert(id.clone(), self.health_of(id).await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCache;

    #[tokio::test]
    async fn provider_below_threshold_is_healthy() {
        let cache = Arc::new(MemoryCache::new());
        let oracle = HealthOracle::new(cache.clone(), 3);
        cache.incr(&HealthOracle::failure_cache_key("openai")).await.unwrap();
        assert_eq!(oracle.health_of("openai").await, HealthTag::Healthy);
    }

    #[tokio::test]
    async fn provider_at_threshold_is_down() {
        let cache = Arc::new(MemoryCache::new());
        let oracle = HealthOracle::new(cache.clone(), 2);
        let key = HealthOracle::failure_cache_key("openai");
        cache.incr(&key).await.unwrap();
        cache.incr(&key).await.unwrap();
        assert_eq!(oracle.health_of("openai").await, HealthTag::Down);
    }

    #[tokio::test]
    async fn provider_with_no_counter_is_healthy() {
        let cache = Arc::new(MemoryCache::new());
        let oracle = HealthOracle::new(cache, 3);
        assert_eq!(oracle.health_of("openai").await, HealthTag::Healthy);
    }
}
