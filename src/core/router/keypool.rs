//! C4 KeyPool: per-provider key rotation, QPS gating, and failure backoff.
//!
//! Grounded on the teacher's `LoadBalancer` provider-table pattern (a
//! `DashMap` of per-provider state behind an async mutex for the parts that
//! must serialize across an await), generalized from round-robin to
//! weighted-random-with-backoff per the routing algorithm.

use super::types::{now_epoch_secs, ProviderKeyState, SelectedKey};
use crate::config::KeyDef;
use crate::storage::CacheStore;
use crate::utils::error::{GatewayError, Result};
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const MIN_WEIGHT: f64 = 0.0001;
const BASE_BACKOFF_RETRYABLE_SECS: f64 = 1.0;
const BASE_BACKOFF_NON_RETRYABLE_SECS: f64 = 5.0;
const MAX_BACKOFF_EXPONENT: u32 = 5;
const BACKOFF_FLOOR_AUTH_SECS: i64 = 30;
const BACKOFF_CAP_SECS: i64 = 60;

struct ProviderKeys {
    keys: Mutex<Vec<ProviderKeyState>>,
}

/// Tracks live key state per provider. One instance is shared across the
/// process; `reconcile` keeps it in sync with the latest config on every
/// acquisition so a config reload never loses in-flight backoff state.
pub struct KeyPool {
    cache: Arc<dyn CacheStore>,
    providers: DashMap<String, Arc<ProviderKeys>>,
}

impl KeyPool {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self {
            cache,
            providers: DashMap::new(),
        }
    }

    fn label_for(key: &str, idx: usize, explicit: Option<&str>) -> String {
        if let Some(label) = explicit {
            return label.to_string();
        }
        let last4 = if key.len() >= 4 { &key[key.len() - 4..] } else { key };
        format!("key{}-***{last4}", idx + 1)
    }

    /// Ensure in-memory state for `provider_id` matches its configured keys,
    /// preserving `fail_count`/`backoff_until` for keys that still exist and
    /// dropping state for keys that were removed from config.
    fn reconcile(&self, provider_id: &str, _configured: &[KeyDef]) -> Arc<ProviderKeys> {
        let entry = self
            .providers
            .entry(provider_id.to_string())
            .or_insert_with(|| {
                Arc::new(ProviderKeys {
                    keys: Mutex::new(Vec::new()),
                })
            })
            .clone();
        entry
    }

    async fn reconciled_keys(&self, provider_id: &str, configured: &[KeyDef]) -> Arc<ProviderKeys> {
        let state = self.reconcile(provider_id, configured);
        {
            let mut guard = state.keys.lock().await;
            let mut next = Vec::with_capacity(configured.len());
            for (idx, def) in configured.iter().enumerate() {
                let label = Self::label_for(&def.key, idx, def.label.as_deref());
                if let Some(existing) = guard.iter().find(|k| k.key == def.key) {
                    let mut carried = existing.clone();
                    carried.label = label;
                    carried.weight = def.weight;
                    carried.max_qps = def.max_qps;
                    next.push(carried);
                } else {
                    next.push(ProviderKeyState::new(def.key.clone(), label, def.weight, def.max_qps));
                }
            }
            *guard = next;
        }
        state
    }

    fn qps_bucket_key(provider_id: &str, label: &str) -> String {
        format!("provider:{provider_id}:key:{label}:qps:{}", now_epoch_secs())
    }

    /// Select a key for `provider_id`, applying backoff and (if configured)
    /// per-key QPS limiting. Returns `NoAvailableKey` if every key is
    /// currently backed off or every candidate is rate-limited.
    pub async fn acquire(&self, provider_id: &str, configured: &[KeyDef]) -> Result<SelectedKey> {
        let state = self.reconciled_keys(provider_id, configured).await;
        let now = now_epoch_secs();

        // Keys found saturated for the current second, scoped to this one
        // acquisition. Unlike backoff, QPS saturation clears itself on the
        // next unix-second tick, so it must not be written back into shared
        // key state — it is excluded here only, for this call.
        let mut qps_excluded: HashSet<String> = HashSet::new();

        loop {
            let candidates: Vec<ProviderKeyState> = {
                let guard = state.keys.lock().await;
                guard
                    .iter()
                    .filter(|k| !k.in_backoff(now) && !qps_excluded.contains(&k.label))
                    .cloned()
                    .collect()
            };

            if candidates.is_empty() {
                let reason = if qps_excluded.is_empty() {
                    "all-in-backoff"
                } else {
                    "rate-limited"
                };
                return Err(GatewayError::NoAvailableKey {
                    provider_id: provider_id.to_string(),
                    reason: reason.to_string(),
                });
            }

            let total_weight: f64 = candidates.iter().map(|k| k.weight.max(MIN_WEIGHT)).sum();
            let mut pick = rand::thread_rng().gen_range(0.0..total_weight);
            let mut chosen = &candidates[candidates.len() - 1];
            for candidate in &candidates {
                let weight = candidate.weight.max(MIN_WEIGHT);
                if pick < weight {
                    chosen = candidate;
                    break;
                }
                pick -= weight;
            }

            if let Some(max_qps) = chosen.max_qps {
                let bucket = Self::qps_bucket_key(provider_id, &chosen.label);
                let count = self.cache.incr(&bucket).await?;
                if count == 1 {
                    self.cache.expire(&bucket, Duration::from_secs(1)).await?;
                }
                if count > max_qps as i64 {
                    // This key is saturated for the current second; drop it
                    // from the working set and retry among the rest.
                    qps_excluded.insert(chosen.label.clone());
                    continue;
                }
            }

            return Ok(SelectedKey {
                provider_id: provider_id.to_string(),
                key: chosen.key.clone(),
                label: chosen.label.clone(),
            });
        }
    }

    pub async fn record_success(&self, provider_id: &str, label: &str) {
        if let Some(state) = self.providers.get(provider_id) {
            let mut guard = state.keys.lock().await;
            if let Some(k) = guard.iter_mut().find(|k| k.label == label) {
                k.fail_count = 0;
                k.backoff_until = 0;
                k.last_used_at = now_epoch_secs();
            }
        }
    }

    pub async fn record_failure(&self, provider_id: &str, label: &str, status: Option<u16>, retryable: bool) {
        if let Some(state) = self.providers.get(provider_id) {
            let mut guard = state.keys.lock().await;
            if let Some(k) = guard.iter_mut().find(|k| k.label == label) {
                k.fail_count += 1;
                let base = if retryable {
                    BASE_BACKOFF_RETRYABLE_SECS
                } else {
                    BASE_BACKOFF_NON_RETRYABLE_SECS
                };
                let exponent = k.fail_count.min(MAX_BACKOFF_EXPONENT);
                let mut backoff_secs = base * 2f64.powi(exponent as i32);

                let floor = matches!(status, Some(401) | Some(403));
                if floor {
                    backoff_secs = backoff_secs.max(BACKOFF_FLOOR_AUTH_SECS as f64);
                }
                let backoff_secs = backoff_secs.min(BACKOFF_CAP_SECS as f64);

                k.backoff_until = now_epoch_secs() + backoff_secs as i64;
            }
        }
    }

    /// Read-only view of a provider's current key states, for an
    /// admin/metrics surface. Does not mutate anything and is not taken
    /// under the same lock discipline as `acquire`/`record_*`: a concurrent
    /// update may be missed, which is acceptable for a diagnostic read.
    pub async fn snapshot(&self, provider_id: &str) -> Vec<ProviderKeyStateView> {
        let Some(state) = self.providers.get(provider_id) else {
            return Vec::new();
        };
        let guard = state.keys.lock().await;
        guard
            .iter()
            .map(|k| ProviderKeyStateView {
                label: k.label.clone(),
                weight: k.weight,
                max_qps: k.max_qps,
                fail_count: k.fail_count,
                backoff_until: k.backoff_until,
            })
            .collect()
    }
}

/// Point-in-time view of one key's state, carrying no secret material.
#[derive(Debug, Clone)]
pub struct ProviderKeyStateView {
    pub label: String,
    pub weight: f64,
    pub max_qps: Option<u32>,
    pub fail_count: u32,
    pub backoff_until: i64,
}
