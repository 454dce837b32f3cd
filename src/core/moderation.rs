//! Pluggable moderation gate, consulted before any provider is contacted and
//! again (optionally) after a response comes back. No-op by default; a
//! deployment wires in a real classifier by implementing `ModerationGate`.

use crate::utils::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ModerationGate: Send + Sync {
    /// Inspect inbound content before routing. `Err(ModerationDenied)` stops
    /// the request before any provider is consulted.
    async fn check_inbound(&self, content: &str) -> Result<()>;

    /// Inspect the upstream's response before it reaches the client.
    async fn check_outbound(&self, content: &str) -> Result<()>;
}

/// Allows everything; the default when no moderation backend is configured.
pub struct NoopModerationGate;

#[async_trait]
impl ModerationGate for NoopModerationGate {
    async fn check_inbound(&self, _content: &str) -> Result<()> {
        Ok(())
    }

    async fn check_outbound(&self, _content: &str) -> Result<()> {
        Ok(())
    }
}
