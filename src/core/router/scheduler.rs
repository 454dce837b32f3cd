//! C5 Scheduler: ranks a logical model's upstreams into a deterministic
//! candidate order. Pure function over its inputs so the algorithm is
//! unit-testable without touching the cache or network.

use super::types::{CandidateScore, HealthTag, LogicalModel, RoutingMetrics, Session, Strategy};
use crate::utils::error::{GatewayError, Result};
use std::collections::{HashMap, HashSet};

/// Multiplier applied when a candidate matches the caller's sticky session.
/// Large enough to dominate any plausible metrics-derived score.
const STICKY_BOOST: f64 = 10.0;

pub struct SchedulerInput<'a> {
    pub logical_model: &'a LogicalModel,
    pub metrics: &'a HashMap<String, RoutingMetrics>,
    pub health: &'a HashMap<String, HealthTag>,
    pub dynamic_weights: Option<&'a HashMap<String, f64>>,
    pub session: Option<&'a Session>,
    pub health_enabled: bool,
    pub latency_cap_ms: f64,
    /// Provider ids an admin has pushed an out-of-band disable for (spec
    /// §4.1 filter 2). Checked independently of health: a provider can be
    /// `healthy` and still be administratively disabled.
    pub disabled_providers: &'a HashSet<String>,
}

fn normalize_latency(latency_ms: f64, cap_ms: f64) -> f64 {
    if cap_ms <= 0.0 {
        0.0
    } else {
        (latency_ms / cap_ms).max(0.0)
    }
}

/// Rank a logical model's upstreams, highest score first. Ties break on
/// `(provider_id, model_id)` so repeated calls with identical inputs always
/// produce the same order.
pub fn rank(input: SchedulerInput<'_>) -> Result<Vec<CandidateScore>> {
    let SchedulerInput {
        logical_model,
        metrics,
        health,
        dynamic_weights,
        session,
        health_enabled,
        latency_cap_ms,
        disabled_providers,
    } = input;

    let mut candidates: Vec<CandidateScore> = logical_model
        .upstreams
        .iter()
        .filter(|upstream| {
            if health_enabled && matches!(health.get(&upstream.provider_id), Some(HealthTag::Down)) {
                return false;
            }
            !disabled_providers.contains(&upstream.provider_id)
        })
        .map(|upstream| {
            let provider_metrics = metrics.get(&upstream.provider_id).cloned();
            let mut score = upstream.base_weight;

            if let Some(m) = &provider_metrics {
                score *= (1.0 - m.error_rate).max(0.0);
                score /= 1.0 + normalize_latency(m.latency_p95_ms, latency_cap_ms);
            }

            match logical_model.strategy {
                Strategy::Balanced | Strategy::StickyFirst => {}
                Strategy::LatencyFirst => {
                    if let Some(m) = &provider_metrics {
                        score *= 1.0 / (1.0 + normalize_latency(m.latency_p50_ms, latency_cap_ms));
                    }
                }
                Strategy::Weighted => {
                    score = dynamic_weights
                        .and_then(|weights| weights.get(&upstream.provider_id))
                        .copied()
                        .unwrap_or(upstream.base_weight);
                }
            }

            if let Some(session) = session {
                if session.provider_id == upstream.provider_id && session.model_id == upstream.model_id {
                    score *= STICKY_BOOST;
                }
            }

            CandidateScore {
                upstream: upstream.clone(),
                metrics: provider_metrics,
                score,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.upstream.provider_id.cmp(&b.upstream.provider_id))
            .then_with(|| a.upstream.model_id.cmp(&b.upstream.model_id))
    });

    if candidates.is_empty() {
        return Err(GatewayError::NoCandidates(logical_model.logical_id.clone()));
    }

    Ok(candidates)
}
