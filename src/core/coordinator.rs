//! C9 RequestCoordinator: the single orchestration path all three inbound
//! route handlers (chat completions, responses, messages) share.
//!
//! Grounded on the teacher's `Router::execute` entrypoint (moderation/guard
//! checks up front, delegate to the load balancer, post-process on the way
//! out), rebuilt against this gateway's selector/retry-engine split.

use super::moderation::ModerationGate;
use super::router::provider_selector::ProviderSelector;
use super::router::retry_engine::RetryEngine;
use super::router::session::SessionStore;
use super::router::types::LogicalModel;
use super::usage::{UsageRecord, UsageRecorder};
use crate::config::ProviderDef;
use crate::utils::error::{GatewayError, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// One inbound request, already decoded from whichever wire format (chat
/// completions / responses / messages) the route handler accepted.
pub struct RoutedRequest {
    pub logical_model_id: String,
    pub conversation_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub payload: Vec<u8>,
    pub moderation_content: String,
    pub streaming: bool,
}

pub struct RoutedResponse {
    pub status: u16,
    pub body: Bytes,
}

pub struct RequestCoordinator {
    logical_models: HashMap<String, LogicalModel>,
    providers: Arc<HashMap<String, ProviderDef>>,
    selector: ProviderSelector,
    retry_engine: Arc<RetryEngine>,
    sessions: Arc<SessionStore>,
    moderation: Arc<dyn ModerationGate>,
    usage: Arc<dyn UsageRecorder>,
    cache: Arc<dyn crate::storage::CacheStore>,
}

impl RequestCoordinator {
    pub fn new(
        logical_models: HashMap<String, LogicalModel>,
        providers: Arc<HashMap<String, ProviderDef>>,
        selector: ProviderSelector,
        retry_engine: Arc<RetryEngine>,
        sessions: Arc<SessionStore>,
        moderation: Arc<dyn ModerationGate>,
        usage: Arc<dyn UsageRecorder>,
        cache: Arc<dyn crate::storage::CacheStore>,
    ) -> Self {
        Self {
            logical_models,
            providers,
            selector,
            retry_engine,
            sessions,
            moderation,
            usage,
            cache,
        }
    }

    fn logical_model(&self, id: &str) -> Result<&LogicalModel> {
        self.logical_models
            .get(id)
            .ok_or_else(|| GatewayError::LogicalModelMissing(id.to_string()))
    }

    fn stream_marker_key(idempotency_key: &str) -> String {
        format!("usage:stream-marker:{idempotency_key}")
    }

    pub async fn handle_non_stream(&self, request: RoutedRequest) -> Result<RoutedResponse> {
        self.moderation.check_inbound(&request.moderation_content).await?;

        let logical_model = self.logical_model(&request.logical_model_id)?;
        let candidates = self
            .selector
            .select(logical_model, request.conversation_id.as_deref())
            .await?;

        let success = self
            .retry_engine
            .try_non_stream(
                &request.logical_model_id,
                &candidates,
                &self.providers,
                &request.payload,
            )
            .await?;

        if let Some(conversation_id) = &request.conversation_id {
            self.sessions
                .bind(
                    conversation_id,
                    &request.logical_model_id,
                    &success.candidate.upstream.provider_id,
                    &success.candidate.upstream.model_id,
                )
                .await?;
        }

        let body_text = String::from_utf8_lossy(&success.response.body).to_string();
        self.moderation.check_outbound(&body_text).await?;

        self.usage
            .record(UsageRecord {
                logical_model: request.logical_model_id,
                provider_id: success.candidate.upstream.provider_id,
                model_id: success.candidate.upstream.model_id,
                idempotency_key: request.idempotency_key,
                prompt_tokens: None,
                completion_tokens: None,
            })
            .await;

        Ok(RoutedResponse {
            status: success.response.status,
            body: success.response.body,
        })
    }

    pub async fn handle_stream(
        &self,
        request: RoutedRequest,
    ) -> Result<Pin<Box<dyn futures_util::Stream<Item = std::result::Result<Bytes, GatewayError>> + Send>>> {
        self.moderation.check_inbound(&request.moderation_content).await?;

        if let Some(idempotency_key) = &request.idempotency_key {
            let marker = Self::stream_marker_key(idempotency_key);
            self.cache.set(&marker, "1", Some(Duration::from_secs(3600))).await?;
        }

        let logical_model = self.logical_model(&request.logical_model_id)?;
        let candidates = self
            .selector
            .select(logical_model, request.conversation_id.as_deref())
            .await?;

        let sessions = self.sessions.clone();
        let conversation_id = request.conversation_id.clone();
        let logical_model_id = request.logical_model_id.clone();
        let on_first_chunk: Arc<dyn Fn(&super::router::types::CandidateScore) + Send + Sync> =
            Arc::new(move |candidate| {
                if let Some(conversation_id) = conversation_id.clone() {
                    let sessions = sessions.clone();
                    let logical_model_id = logical_model_id.clone();
                    let provider_id = candidate.upstream.provider_id.clone();
                    let model_id = candidate.upstream.model_id.clone();
                    tokio::spawn(async move {
                        let _ = sessions
                            .bind(&conversation_id, &logical_model_id, &provider_id, &model_id)
                            .await;
                    });
                }
            });

        Ok(self.retry_engine.clone().try_stream(
            request.logical_model_id,
            candidates,
            self.providers.clone(),
            request.payload,
            on_first_chunk,
        ))
    }
}
