//! C8 CandidateRetryEngine: walks a ranked candidate list, skipping
//! providers in cooldown, retrying retryable failures, and stopping at the
//! first success or the first non-retryable failure.
//!
//! Grounded on the teacher's `execute_impl`/`fallback` retry loop shape
//! (iterate deployments, classify the error, decide whether to continue),
//! rewritten against this gateway's `CandidateScore`/`KeyPool`/
//! `TransportDispatcher` types.

use super::keypool::KeyPool;
use super::types::CandidateScore;
use crate::config::ProviderDef;
use crate::core::transport::{TransportDispatcher, TransportResponse};
use crate::utils::error::{GatewayError, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Statuses that count toward a provider's failure cooldown (C1's
/// `provider:failure:{provider_id}` counter), distinct from "retryable".
const COOLDOWN_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

fn is_retryable(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(s) => s == 408 || s == 429 || (500..=599).contains(&s),
    }
}

/// Rewrite the outbound body's `model` field to the candidate's physical
/// `model_id` (spec §6 Outbound). This is the one body rewrite the gateway
/// performs; everything else about the client's payload passes through
/// untouched. Falls back to the original bytes if the payload isn't a JSON
/// object, so a malformed body still reaches the upstream verbatim and
/// fails there rather than being swallowed here.
fn with_physical_model(payload: &[u8], model_id: &str) -> Vec<u8> {
    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(payload) else {
        return payload.to_vec();
    };
    let Some(obj) = value.as_object_mut() else {
        return payload.to_vec();
    };
    obj.insert("model".to_string(), serde_json::Value::String(model_id.to_string()));
    serde_json::to_vec(&value).unwrap_or_else(|_| payload.to_vec())
}

pub struct RetryEngine {
    cache: Arc<dyn crate::storage::CacheStore>,
    keypool: Arc<KeyPool>,
    transport: Arc<dyn TransportDispatcher>,
    failure_threshold: i64,
    cooldown: Duration,
}

/// Outcome of a successful attempt the coordinator uses to bind a session.
pub struct Success<T> {
    pub candidate: CandidateScore,
    pub response: T,
}

struct AttemptState {
    skipped: u32,
    tried: u32,
    last_status: Option<u16>,
    last_error: String,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            skipped: 0,
            tried: 0,
            last_status: None,
            last_error: "no candidates attempted".to_string(),
        }
    }

    fn into_err(self, logical_model_id: &str) -> GatewayError {
        GatewayError::AllProvidersFailed {
            logical_model_id: logical_model_id.to_string(),
            last_status: self.last_status,
            last_error: self.last_error,
            skipped: self.skipped,
            tried: self.tried,
        }
    }
}

impl RetryEngine {
    pub fn new(
        cache: Arc<dyn crate::storage::CacheStore>,
        keypool: Arc<KeyPool>,
        transport: Arc<dyn TransportDispatcher>,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            cache,
            keypool,
            transport,
            failure_threshold: failure_threshold as i64,
            cooldown,
        }
    }

    fn failure_key(provider_id: &str) -> String {
        format!("provider:failure:{provider_id}")
    }

    async fn in_cooldown(&self, provider_id: &str) -> bool {
        matches!(
            self.cache.get_int(&Self::failure_key(provider_id)).await,
            Ok(Some(count)) if count >= self.failure_threshold
        )
    }

    async fn note_cooldown_failure(&self, provider_id: &str, status: Option<u16>) -> Result<()> {
        if let Some(status) = status {
            if COOLDOWN_STATUSES.contains(&status) {
                let key = Self::failure_key(provider_id);
                self.cache.incr(&key).await?;
                self.cache.expire(&key, self.cooldown).await?;
            }
        }
        Ok(())
    }

    /// Run the non-streaming attempt loop to completion.
    pub async fn try_non_stream(
        &self,
        logical_model_id: &str,
        candidates: &[CandidateScore],
        providers: &HashMap<String, ProviderDef>,
        payload: &[u8],
    ) -> Result<Success<TransportResponse>> {
        let mut state = AttemptState::new();
        let last_index = candidates.len().saturating_sub(1);

        for (idx, candidate) in candidates.iter().enumerate() {
            let provider_id = &candidate.upstream.provider_id;
            if self.in_cooldown(provider_id).await {
                state.skipped += 1;
                continue;
            }

            let Some(provider_def) = providers.get(provider_id) else {
                state.last_error = format!("provider '{provider_id}' is not configured");
                continue;
            };

            let key = match self.keypool.acquire(provider_id, &provider_def.keys).await {
                Ok(key) => key,
                Err(e) => {
                    state.last_error = e.to_string();
                    continue;
                }
            };

            state.tried += 1;
            let outbound = with_physical_model(payload, &candidate.upstream.model_id);
            let dispatch_result = self
                .transport
                .dispatch(&candidate.upstream.endpoint, &key, &provider_def.custom_headers, &outbound)
                .await;

            match dispatch_result {
                Ok(response) if (200..300).contains(&response.status) => {
                    self.cache.delete(&Self::failure_key(provider_id)).await.ok();
                    self.keypool.record_success(provider_id, &key.label).await;
                    return Ok(Success {
                        candidate: candidate.clone(),
                        response,
                    });
                }
                Ok(response) => {
                    let status = Some(response.status);
                    let retryable = is_retryable(status);
                    self.keypool.record_failure(provider_id, &key.label, status, retryable).await;
                    self.note_cooldown_failure(provider_id, status).await?;
                    state.last_status = status;
                    state.last_error = String::from_utf8_lossy(&response.body).to_string();
                    if retryable && idx != last_index {
                        continue;
                    }
                    return Err(state.into_err(logical_model_id));
                }
                Err(e) => {
                    self.keypool.record_failure(provider_id, &key.label, None, true).await;
                    state.last_status = None;
                    state.last_error = e.to_string();
                    if idx != last_index {
                        continue;
                    }
                    return Err(state.into_err(logical_model_id));
                }
            }
        }

        Err(state.into_err(logical_model_id))
    }

    /// Run the streaming attempt loop. Once any chunk has been yielded to
    /// the caller, no further candidates are tried: a post-latch transport
    /// failure is surfaced as one terminal SSE error chunk instead.
    pub fn try_stream(
        self: Arc<Self>,
        logical_model_id: String,
        candidates: Vec<CandidateScore>,
        providers: Arc<HashMap<String, ProviderDef>>,
        payload: Vec<u8>,
        on_first_chunk: Arc<dyn Fn(&CandidateScore) + Send + Sync>,
    ) -> Pin<Box<dyn futures_util::Stream<Item = std::result::Result<Bytes, GatewayError>> + Send>> {
        let engine = self;
        Box::pin(async_stream::stream! {
            let mut state = AttemptState::new();
            let last_index = candidates.len().saturating_sub(1);
            let mut latched = false;

            'candidates: for (idx, candidate) in candidates.iter().enumerate() {
                let provider_id = &candidate.upstream.provider_id;
                if engine.in_cooldown(provider_id).await {
                    state.skipped += 1;
                    continue;
                }

                let Some(provider_def) = providers.get(provider_id) else {
                    state.last_error = format!("provider '{provider_id}' is not configured");
                    continue;
                };

                let key = match engine.keypool.acquire(provider_id, &provider_def.keys).await {
                    Ok(key) => key,
                    Err(e) => {
                        state.last_error = e.to_string();
                        continue;
                    }
                };

                state.tried += 1;
                let outbound = with_physical_model(&payload, &candidate.upstream.model_id);
                let dispatched = engine
                    .transport
                    .dispatch_stream(&candidate.upstream.endpoint, &key, &provider_def.custom_headers, &outbound)
                    .await;

                let mut transport_stream = match dispatched {
                    Ok(s) if (200..300).contains(&s.status) => s,
                    Ok(s) => {
                        let status = Some(s.status);
                        let retryable = is_retryable(status);
                        engine.keypool.record_failure(provider_id, &key.label, status, retryable).await;
                        let _ = engine.note_cooldown_failure(provider_id, status).await;
                        state.last_status = status;
                        state.last_error = format!("upstream returned status {}", s.status);
                        if retryable && idx != last_index {
                            continue 'candidates;
                        }
                        break 'candidates;
                    }
                    Err(e) => {
                        engine.keypool.record_failure(provider_id, &key.label, None, true).await;
                        state.last_status = None;
                        state.last_error = e.to_string();
                        if idx != last_index {
                            continue 'candidates;
                        }
                        break 'candidates;
                    }
                };

                engine.cache.delete(&Self::failure_key(provider_id)).await.ok();

                while let Some(chunk) = transport_stream.body.next().await {
                    match chunk {
                        Ok(bytes) => {
                            if !latched {
                                latched = true;
                                engine.keypool.record_success(provider_id, &key.label).await;
                                on_first_chunk(candidate);
                            }
                            yield Ok(bytes);
                        }
                        Err(e) => {
                            if latched {
                                let message = e.to_string();
                                yield Ok(terminal_error_chunk(provider_id, None, &message));
                                return;
                            }
                            state.last_error = e.to_string();
                            if idx != last_index {
                                continue 'candidates;
                            }
                            break 'candidates;
                        }
                    }
                }

                if latched {
                    return;
                }
            }

            if !latched {
                yield Err(state.into_err(&logical_model_id));
            }
        })
    }
}

fn terminal_error_chunk(provider_id: &str, status: Option<u16>, message: &str) -> Bytes {
    let payload = serde_json::json!({
        "error": {
            "type": "upstream_error",
            "status": status,
            "message": message,
            "provider_id": provider_id,
        }
    });
    Bytes::from(format!("data: {payload}\n\n"))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyDef;
    use crate::core::router::types::{ApiStyle, PhysicalModel};
    use crate::core::transport::TransportStream;
    use crate::storage::MemoryCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct ScriptedTransport {
        responses: Vec<(u16, &'static str)>,
        calls: AtomicUsize,
        seen_payloads: StdMutex<Vec<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<(u16, &'static str)>) -> Self {
            Self {
                responses,
                calls: AtomicUsize::new(0),
                seen_payloads: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TransportDispatcher for ScriptedTransport {
        async fn dispatch(
            &self,
            _endpoint: &str,
            _key: &super::super::types::SelectedKey,
            _headers: &HashMap<String, String>,
            payload: &[u8],
        ) -> Result<TransportResponse> {
            self.seen_payloads.lock().unwrap().push(payload.to_vec());
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let (status, body) = self.responses[idx.min(self.responses.len() - 1)];
            Ok(TransportResponse {
                status,
                body: Bytes::from(body),
            })
        }

        async fn dispatch_stream(
            &self,
            _endpoint: &str,
            _key: &super::super::types::SelectedKey,
            _headers: &HashMap<String, String>,
            _payload: &[u8],
        ) -> Result<TransportStream> {
            unimplemented!("not exercised in these tests")
        }
    }

    fn candidate(provider_id: &str) -> CandidateScore {
        candidate_with_model(provider_id, "m")
    }

    fn candidate_with_model(provider_id: &str, model_id: &str) -> CandidateScore {
        CandidateScore {
            upstream: PhysicalModel {
                provider_id: provider_id.to_string(),
                model_id: model_id.to_string(),
                endpoint: format!("https://{provider_id}.example/v1"),
                base_weight: 1.0,
                updated_at: 0,
                api_style: ApiStyle::ChatCompletions,
            },
            metrics: None,
            score: 1.0,
        }
    }

    fn provider(id: &str) -> ProviderDef {
        ProviderDef {
            id: id.to_string(),
            name: id.to_string(),
            base_url: format!("https://{id}.example"),
            keys: vec![KeyDef {
                key: "sk-test".to_string(),
                weight: 1.0,
                max_qps: None,
                label: None,
            }],
            transport: "http".to_string(),
            custom_headers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_healthy_candidate() {
        let cache = Arc::new(MemoryCache::new());
        let keypool = Arc::new(KeyPool::new(cache.clone()));
        let transport = Arc::new(ScriptedTransport::new(vec![(200, "ok")]));
        let engine = RetryEngine::new(cache, keypool, transport, 3, Duration::from_secs(60));

        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), provider("openai"));

        let result = engine
            .try_non_stream("gpt-4", &[candidate("openai")], &providers, b"{}")
            .await
            .unwrap();
        assert_eq!(result.response.status, 200);
    }

    #[tokio::test]
    async fn dispatch_rewrites_model_to_candidates_physical_model_id() {
        let cache = Arc::new(MemoryCache::new());
        let keypool = Arc::new(KeyPool::new(cache.clone()));
        let transport = Arc::new(ScriptedTransport::new(vec![(200, "ok")]));
        let seen = transport.clone();
        let engine = RetryEngine::new(cache, keypool, transport, 3, Duration::from_secs(60));

        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), provider("openai"));

        engine
            .try_non_stream(
                "gpt-4",
                &[candidate_with_model("openai", "gpt-4o")],
                &providers,
                br#"{"model":"gpt-4","messages":[]}"#,
            )
            .await
            .unwrap();

        let sent = seen.seen_payloads.lock().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn retryable_failure_cascades_to_next_candidate() {
        let cache = Arc::new(MemoryCache::new());
        let keypool = Arc::new(KeyPool::new(cache.clone()));
        let transport = Arc::new(ScriptedTransport::new(vec![(503, "busy"), (200, "ok")]));
        let engine = RetryEngine::new(cache, keypool, transport, 3, Duration::from_secs(60));

        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), provider("openai"));
        providers.insert("azure".to_string(), provider("azure"));

        let result = engine
            .try_non_stream(
                "gpt-4",
                &[candidate("openai"), candidate("azure")],
                &providers,
                b"{}",
            )
            .await
            .unwrap();
        assert_eq!(result.candidate.upstream.provider_id, "azure");
    }

    #[tokio::test]
    async fn non_retryable_failure_fails_immediately_even_with_candidates_left() {
        let cache = Arc::new(MemoryCache::new());
        let keypool = Arc::new(KeyPool::new(cache.clone()));
        let transport = Arc::new(ScriptedTransport::new(vec![(401, "bad key")]));
        let engine = RetryEngine::new(cache, keypool, transport, 3, Duration::from_secs(60));

        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), provider("openai"));
        providers.insert("azure".to_string(), provider("azure"));

        let err = engine
            .try_non_stream(
                "gpt-4",
                &[candidate("openai"), candidate("azure")],
                &providers,
                b"{}",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AllProvidersFailed { tried: 1, .. }));
    }

    #[tokio::test]
    async fn candidate_in_cooldown_is_skipped() {
        let cache = Arc::new(MemoryCache::new());
        cache.incr("provider:failure:openai").await.unwrap();
        cache.incr("provider:failure:openai").await.unwrap();
        cache.incr("provider:failure:openai").await.unwrap();
        let keypool = Arc::new(KeyPool::new(cache.clone()));
        let transport = Arc::new(ScriptedTransport::new(vec![(200, "ok")]));
        let engine = RetryEngine::new(cache, keypool, transport, 3, Duration::from_secs(60));

        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), provider("openai"));
        providers.insert("azure".to_string(), provider("azure"));

        let result = engine
            .try_non_stream(
                "gpt-4",
                &[candidate("openai"), candidate("azure")],
                &providers,
                b"{}",
            )
            .await
            .unwrap();
        assert_eq!(result.candidate.upstream.provider_id, "azure");
    }

    #[tokio::test]
    async fn all_candidates_in_cooldown_fails_with_skip_count() {
        let cache = Arc::new(MemoryCache::new());
        for _ in 0..3 {
            cache.incr("provider:failure:openai").await.unwrap();
        }
        let keypool = Arc::new(KeyPool::new(cache.clone()));
        let transport = Arc::new(ScriptedTransport::new(vec![(200, "ok")]));
        let engine = RetryEngine::new(cache, keypool, transport, 3, Duration::from_secs(60));

        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), provider("openai"));

        let err = engine
            .try_non_stream("gpt-4", &[candidate("openai")], &providers, b"{}")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::AllProvidersFailed { skipped: 1, tried: 0, .. }
        ));
    }
}
