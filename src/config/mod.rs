//! Gateway configuration model.
//!
//! Shaped after the teacher's `config::models::{provider,router}` structs:
//! one `serde`-derived struct per concern, `#[serde(default = "...")]` for
//! every tunable, and a `GatewayConfig::load` entrypoint that layers a YAML
//! file under environment variable overrides (teacher's `config` crate +
//! `dotenvy` convention).

pub mod loader;

use crate::core::router::types::Strategy;
use serde::{Deserialize, Serialize};

/// Top-level gateway configuration, loaded from `config/gateway.yaml` (or
/// the path in `GATEWAY_CONFIG_PATH`) with environment variable overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: Vec<ProviderDef>,
    #[serde(default)]
    pub logical_models: Vec<LogicalModelDef>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            router: RouterSettings::default(),
            cache: CacheConfig::default(),
            providers: Vec::new(),
            logical_models: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_workers() -> usize {
    num_cpus::get()
}

/// Router-wide tunables named explicitly in the external interface section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Failures in window before a provider enters cooldown.
    #[serde(default = "default_failure_threshold")]
    pub provider_failure_threshold: u32,
    /// Cooldown window length, also the TTL of the failure counter.
    #[serde(default = "default_cooldown_seconds")]
    pub provider_failure_cooldown_seconds: u64,
    /// Whether the scheduler drops upstreams whose provider is `down`.
    #[serde(default = "default_true")]
    pub enable_provider_health_check: bool,
    /// Latency (ms) above which the p95 latency penalty saturates.
    #[serde(default = "default_latency_cap_ms")]
    pub latency_cap_ms: f64,
    /// Total-deadline timeout (seconds) for a single upstream dispatch
    /// (spec §5: exceeding it is treated as a retryable, status-less
    /// failure).
    #[serde(default = "default_dispatch_timeout_seconds")]
    pub dispatch_timeout_seconds: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            provider_failure_threshold: default_failure_threshold(),
            provider_failure_cooldown_seconds: default_cooldown_seconds(),
            enable_provider_health_check: true,
            latency_cap_ms: default_latency_cap_ms(),
            dispatch_timeout_seconds: default_dispatch_timeout_seconds(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_cooldown_seconds() -> u64 {
    60
}
fn default_latency_cap_ms() -> f64 {
    2000.0
}
fn default_dispatch_timeout_seconds() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL. If absent, the cache runs in no-op (in-memory) mode.
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { redis_url: None }
    }
}

/// One API key belonging to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDef {
    pub key: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub max_qps: Option<u32>,
    pub label: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

/// A configured upstream provider: an endpoint plus one or more API keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDef {
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub keys: Vec<KeyDef>,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default)]
    pub custom_headers: std::collections::HashMap<String, String>,
}

fn default_transport() -> String {
    "http".to_string()
}

/// One physical upstream a logical model can be resolved to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamDef {
    pub provider_id: String,
    pub model_id: String,
    pub endpoint: String,
    #[serde(default = "default_weight")]
    pub base_weight: f64,
}

/// A client-facing model name mapped to a set of physical upstreams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalModelDef {
    pub logical_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub upstreams: Vec<UpstreamDef>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_true")]
    pub enabled: bool,
}
