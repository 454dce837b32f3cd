//! Pluggable billing/usage recorder, invoked once a request completes.
//! No-op by default; a deployment wires in a real sink (database, metering
//! service) by implementing `UsageRecorder`.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub logical_model: String,
    pub provider_id: String,
    pub model_id: String,
    pub idempotency_key: Option<String>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, usage: UsageRecord);
}

pub struct NoopUsageRecorder;

#[async_trait]
impl UsageRecorder for NoopUsageRecorder {
    async fn record(&self, _usage: UsageRecord) {}
}
