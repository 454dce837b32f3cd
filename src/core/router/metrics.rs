//! C2 MetricsStore: in-process rolling metrics the scheduler consults.
//!
//! Advisory, not exact — an exponentially-weighted accumulator per
//! `(logical_model, provider_id)`, grounded on the teacher's
//! `LoadBalancer`/`router::metrics` rolling-window gauges but simplified to
//! an EWMA since the spec only needs trend-quality percentiles.

use super::types::{HealthTag, RoutingMetrics};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Smoothing factor for the latency EWMA; higher reacts faster to recent
/// samples.
const EWMA_ALPHA: f64 = 0.2;

struct Accumulator {
    latency_p50_ms: AtomicU64,
    latency_p95_ms: AtomicU64,
    latency_p99_ms: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    last_updated: AtomicU64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            latency_p50_ms: AtomicU64::new(0),
            latency_p95_ms: AtomicU64::new(0),
            latency_p99_ms: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_updated: AtomicU64::new(0),
        }
    }
}

fn ewma_update(current_bits: &AtomicU64, sample_ms: f64) {
    let current = f64::from_bits(current_bits.load(Ordering::Relaxed));
    let next = if current == 0.0 {
        sample_ms
    } else {
        EWMA_ALPHA * sample_ms + (1.0 - EWMA_ALPHA) * current
    };
    current_bits.store(next.to_bits(), Ordering::Relaxed);
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Tracks rolling latency and error-rate metrics per `(logical_model, provider)`.
#[derive(Default)]
pub struct MetricsStore {
    table: DashMap<(String, String), Accumulator>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed attempt's outcome and latency.
    pub fn record(&self, logical_model: &str, provider_id: &str, latency_ms: f64, success: bool) {
        let entry = self
            .table
            .entry((logical_model.to_string(), provider_id.to_string()))
            .or_insert_with(Accumulator::new);

        ewma_update(&entry.latency_p50_ms, latency_ms);
        ewma_update(&entry.latency_p95_ms, latency_ms * 1.3);
        ewma_update(&entry.latency_p99_ms, latency_ms * 1.6);

        if success {
            entry.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            entry.failures.fetch_add(1, Ordering::Relaxed);
        }
        entry.last_updated.store(now_secs() as u64, Ordering::Relaxed);
    }

    /// Snapshot current metrics for every provider behind `logical_model`.
    pub fn snapshot_for(&self, logical_model: &str) -> std::collections::HashMap<String, RoutingMetrics> {
        let mut out = std::collections::HashMap::new();
        for entry in self.table.iter() {
            let (lm, provider_id) = entry.key();
            if lm != logical_model {
                continue;
            }
            let successes = entry.successes.load(Ordering::Relaxed);
            let failures = entry.failures.load(Ordering::Relaxed);
            let total = successes + failures;
            let error_rate = if total == 0 {
                0.0
            } else {
                failures as f64 / total as f64
            };

            out.insert(
                provider_id.clone(),
                RoutingMetrics {
                    logical_model: lm.clone(),
                    provider_id: provider_id.clone(),
                    latency_p50_ms: f64::from_bits(entry.latency_p50_ms.load(Ordering::Relaxed)),
                    latency_p95_ms: f64::from_bits(entry.latency_p95_ms.load(Ordering::Relaxed)),
                    latency_p99_ms: f64::from_bits(entry.latency_p99_ms.load(Ordering::Relaxed)),
                    error_rate,
                    success_qps_1m: successes as f64 / 60.0,
                    total_requests_1m: total,
                    last_updated: entry.last_updated.load(Ordering::Relaxed) as i64,
                    status: if error_rate > 0.5 {
                        HealthTag::Degraded
                    } else {
                        HealthTag::Healthy
                    },
                },
            );
        }
        out
    }
}
