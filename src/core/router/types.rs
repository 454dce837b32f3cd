//! Routing data model (spec §3), realized as `serde`-derived value types
//! mirroring the teacher's one-struct-per-concern `config::models` style.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the epoch, used for session/key timestamps.
pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Wire-format family a physical upstream speaks, carried through so the
/// coordinator knows which inbound route shape it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    ChatCompletions,
    Responses,
    Claude,
}

impl Default for ApiStyle {
    fn default() -> Self {
        ApiStyle::ChatCompletions
    }
}

/// One concrete `(provider, model, endpoint)` that can serve a logical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalModel {
    pub provider_id: String,
    pub model_id: String,
    pub endpoint: String,
    pub base_weight: f64,
    pub updated_at: i64,
    #[serde(default)]
    pub api_style: ApiStyle,
}

/// The routing strategy plugged into the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Balanced,
    LatencyFirst,
    Weighted,
    StickyFirst,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Balanced
    }
}

/// A client-facing model name resolved to a set of physical upstreams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalModel {
    pub logical_id: String,
    pub display_name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub upstreams: Vec<PhysicalModel>,
    pub strategy: Strategy,
    pub updated_at: i64,
    pub enabled: bool,
}

/// Per-provider health tag returned by the `HealthOracle` (C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTag {
    Healthy,
    Degraded,
    Down,
    Unknown,
}

impl Default for HealthTag {
    fn default() -> Self {
        HealthTag::Unknown
    }
}

/// A recent routing-metrics summary for one `(logical_model, provider)` pair.
/// Percentiles are trend-oriented weighted averages, not exact — advisory
/// input to the scheduler, never claimed to be precise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingMetrics {
    pub logical_model: String,
    pub provider_id: String,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub error_rate: f64,
    pub success_qps_1m: f64,
    pub total_requests_1m: u64,
    pub last_updated: i64,
    pub status: HealthTag,
}

/// An upstream that survived filtering, carrying its computed score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub upstream: PhysicalModel,
    pub metrics: Option<RoutingMetrics>,
    pub score: f64,
}

/// A sticky conversation → upstream binding, persisted in C1 under
/// `routing:session:{conversation_id}`.
///
/// The external JSON form uses `last_used_at`; older records serialized the
/// same datum as `last_accessed`. Both are accepted on read; only
/// `last_used_at` is ever written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub conversation_id: String,
    pub logical_model: String,
    pub provider_id: String,
    pub model_id: String,
    pub created_at: i64,
    #[serde(rename = "last_used_at", alias = "last_accessed")]
    pub last_accessed: i64,
    pub message_count: u32,
}

impl Session {
    pub fn cache_key(conversation_id: &str) -> String {
        format!("routing:session:{conversation_id}")
    }
}

impl From<&crate::config::UpstreamDef> for PhysicalModel {
    fn from(def: &crate::config::UpstreamDef) -> Self {
        PhysicalModel {
            provider_id: def.provider_id.clone(),
            model_id: def.model_id.clone(),
            endpoint: def.endpoint.clone(),
            base_weight: def.base_weight,
            updated_at: now_epoch_secs(),
            api_style: ApiStyle::default(),
        }
    }
}

impl From<&crate::config::LogicalModelDef> for LogicalModel {
    fn from(def: &crate::config::LogicalModelDef) -> Self {
        LogicalModel {
            logical_id: def.logical_id.clone(),
            display_name: if def.display_name.is_empty() {
                def.logical_id.clone()
            } else {
                def.display_name.clone()
            },
            capabilities: def.capabilities.clone(),
            upstreams: def.upstreams.iter().map(PhysicalModel::from).collect(),
            strategy: def.strategy,
            updated_at: now_epoch_secs(),
            enabled: def.enabled,
        }
    }
}

/// In-process per-key state owned by the `KeyPool` (C4). Reconciled against
/// provider config on every acquisition; lives for the process lifetime.
#[derive(Debug, Clone)]
pub struct ProviderKeyState {
    pub key: String,
    pub label: String,
    pub weight: f64,
    pub max_qps: Option<u32>,
    pub fail_count: u32,
    pub backoff_until: i64,
    pub last_used_at: i64,
}

impl ProviderKeyState {
    pub fn new(key: String, label: String, weight: f64, max_qps: Option<u32>) -> Self {
        Self {
            key,
            label,
            weight,
            max_qps,
            fail_count: 0,
            backoff_until: 0,
            last_used_at: 0,
        }
    }

    pub fn in_backoff(&self, now: i64) -> bool {
        self.backoff_until > now
    }
}

/// A key handed to the `TransportDispatcher` for the duration of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedKey {
    pub provider_id: String,
    pub key: String,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_accepts_last_accessed_alias_but_writes_last_used_at() {
        let legacy = r#"{"conversation_id":"c1","logical_model":"gpt-4","provider_id":"openai","model_id":"gpt-4o","created_at":1,"last_accessed":2,"message_count":3}"#;
        let session: Session = serde_json::from_str(legacy).unwrap();
        assert_eq!(session.last_accessed, 2);

        let written = serde_json::to_string(&session).unwrap();
        assert!(written.contains("last_used_at"));
        assert!(!written.contains("last_accessed"));

        let round_tripped: Session = serde_json::from_str(&written).unwrap();
        assert_eq!(round_tripped.last_accessed, 2);
        assert_eq!(round_tripped.message_count, 3);
    }

    #[test]
    fn provider_key_state_reports_backoff() {
        let mut state = ProviderKeyState::new("sk-1".into(), "key1-***1234".into(), 1.0, None);
        state.backoff_until = 1_000;
        assert!(state.in_backoff(500));
        assert!(!state.in_backoff(1_500));
    }
}
