//! Wraps C5 with its inputs: the logical model's config, rolling metrics,
//! the provider health table, any admin-pushed dynamic weights, and the
//! caller's sticky session. This is the "select a ranked candidate list"
//! step of the request flow, one level above the pure scheduler function.

use super::health::HealthOracle;
use super::metrics::MetricsStore;
use super::scheduler::{self, SchedulerInput};
use super::session::SessionStore;
use super::types::{CandidateScore, LogicalModel};
use crate::storage::CacheStore;
use crate::utils::error::{GatewayError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Cache key admins push `{provider_id: weight}` overrides to for the
/// `weighted` strategy. Absent means "use each upstream's `base_weight`".
fn dynamic_weights_key(logical_model_id: &str) -> String {
    format!("routing:weights:{logical_model_id}")
}

/// Cache key admins push a JSON array of administratively-disabled
/// provider ids to (spec §4.1 filter 2) — independent of `HealthOracle`'s
/// failure-derived `Down` tag.
fn disabled_providers_key() -> &'static str {
    "routing:disabled_providers"
}

pub struct ProviderSelector {
    cache: Arc<dyn CacheStore>,
    metrics: Arc<MetricsStore>,
    health: Arc<HealthOracle>,
    sessions: Arc<SessionStore>,
    health_enabled: bool,
    latency_cap_ms: f64,
}

impl ProviderSelector {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        metrics: Arc<MetricsStore>,
        health: Arc<HealthOracle>,
        sessions: Arc<SessionStore>,
        health_enabled: bool,
        latency_cap_ms: f64,
    ) -> Self {
        Self {
            cache,
            metrics,
            health,
            sessions,
            health_enabled,
            latency_cap_ms,
        }
    }

    async fn dynamic_weights(&self, logical_model_id: &str) -> Option<HashMap<String, f64>> {
        let raw = self.cache.get(&dynamic_weights_key(logical_model_id)).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    async fn disabled_providers(&self) -> HashSet<String> {
        let Ok(Some(raw)) = self.cache.get(disabled_providers_key()).await else {
            return HashSet::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    /// Rank `logical_model`'s upstreams for `conversation_id` (if any sticky
    /// session exists for it).
    pub async fn select(
        &self,
        logical_model: &LogicalModel,
        conversation_id: Option<&str>,
    ) -> Result<Vec<CandidateScore>> {
        if !logical_model.enabled {
            return Err(GatewayError::NoUpstreams(logical_model.logical_id.clone()));
        }
        if logical_model.upstreams.is_empty() {
            return Err(GatewayError::NoUpstreams(logical_model.logical_id.clone()));
        }

        let provider_ids: Vec<String> = logical_model
            .upstreams
            .iter()
            .map(|u| u.provider_id.clone())
            .collect();

        let metrics = self.metrics.snapshot_for(&logical_model.logical_id);
        let health = self.health.health_table(&provider_ids).await;
        let dynamic_weights = self.dynamic_weights(&logical_model.logical_id).await;
        let disabled_providers = self.disabled_providers().await;
        let session = match conversation_id {
            Some(id) => self.sessions.get(id).await?,
            None => None,
        };

        scheduler::rank(SchedulerInput {
            logical_model,
            metrics: &metrics,
            health: &health,
            dynamic_weights: dynamic_weights.as_ref(),
            session: session.as_ref(),
            health_enabled: self.health_enabled,
            latency_cap_ms: self.latency_cap_ms,
            disabled_providers: &disabled_providers,
        })
    }
}
