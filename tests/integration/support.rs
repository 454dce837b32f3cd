//! Shared helpers for building a `RequestCoordinator` against real
//! `wiremock` upstream servers.

use litellm_rs::config::{KeyDef, ProviderDef};
use litellm_rs::core::coordinator::RequestCoordinator;
use litellm_rs::core::moderation::NoopModerationGate;
use litellm_rs::core::router::health::HealthOracle;
use litellm_rs::core::router::keypool::KeyPool;
use litellm_rs::core::router::metrics::MetricsStore;
use litellm_rs::core::router::provider_selector::ProviderSelector;
use litellm_rs::core::router::retry_engine::RetryEngine;
use litellm_rs::core::router::session::SessionStore;
use litellm_rs::core::router::types::{ApiStyle, LogicalModel, PhysicalModel, Strategy};
use litellm_rs::core::transport::HttpTransport;
use litellm_rs::core::usage::NoopUsageRecorder;
use litellm_rs::storage::{CacheStore, MemoryCache};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub coordinator: RequestCoordinator,
    pub cache: Arc<dyn CacheStore>,
}

/// One upstream provider backed by a `wiremock::MockServer`, named so tests
/// can assert on which one ultimately served a request.
pub struct UpstreamDef {
    pub provider_id: &'static str,
    pub model_id: &'static str,
    pub base_url: String,
    pub base_weight: f64,
}

pub fn build_harness(logical_id: &str, strategy: Strategy, upstreams: &[UpstreamDef]) -> Harness {
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());

    let physical: Vec<PhysicalModel> = upstreams
        .iter()
        .map(|u| PhysicalModel {
            provider_id: u.provider_id.to_string(),
            model_id: u.model_id.to_string(),
            endpoint: format!("{}/v1/chat/completions", u.base_url),
            base_weight: u.base_weight,
            updated_at: 0,
            api_style: ApiStyle::ChatCompletions,
        })
        .collect();

    let mut logical_models = HashMap::new();
    logical_models.insert(
        logical_id.to_string(),
        LogicalModel {
            logical_id: logical_id.to_string(),
            display_name: logical_id.to_string(),
            capabilities: vec![],
            upstreams: physical,
            strategy,
            updated_at: 0,
            enabled: true,
        },
    );

    let mut providers = HashMap::new();
    for u in upstreams {
        providers.insert(
            u.provider_id.to_string(),
            ProviderDef {
                id: u.provider_id.to_string(),
                name: u.provider_id.to_string(),
                base_url: u.base_url.clone(),
                keys: vec![KeyDef {
                    key: format!("sk-{}-test", u.provider_id),
                    weight: 1.0,
                    max_qps: None,
                    label: None,
                }],
                transport: "http".to_string(),
                custom_headers: HashMap::new(),
            },
        );
    }

    let sessions = Arc::new(SessionStore::new(cache.clone()));
    let selector = ProviderSelector::new(
        cache.clone(),
        Arc::new(MetricsStore::new()),
        Arc::new(HealthOracle::new(cache.clone(), 3)),
        sessions.clone(),
        true,
        2000.0,
    );
    let keypool = Arc::new(KeyPool::new(cache.clone()));
    let retry_engine = Arc::new(RetryEngine::new(
        cache.clone(),
        keypool,
        Arc::new(HttpTransport::new(Duration::from_secs(30))),
        3,
        Duration::from_secs(60),
    ));

    let coordinator = RequestCoordinator::new(
        logical_models,
        Arc::new(providers),
        selector,
        retry_engine,
        sessions,
        Arc::new(NoopModerationGate),
        Arc::new(NoopUsageRecorder),
        cache.clone(),
    );

    Harness { coordinator, cache }
}
