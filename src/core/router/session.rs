//! C6 SessionStore: sticky conversation → upstream bindings in C1.
//!
//! Grounded on the teacher's session-manager JSON-blob-in-cache pattern:
//! read-modify-write through `CacheStore`, no separate database table.

use super::types::{now_epoch_secs, Session};
use crate::storage::CacheStore;
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Sessions are kept for an hour of inactivity; touched on every request
/// that reuses them.
const SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn CacheStore>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Option<Session>> {
        let raw = self.cache.get(&Session::cache_key(conversation_id)).await?;
        Ok(match raw {
            Some(json) => serde_json::from_str(&json).ok(),
            None => None,
        })
    }

    /// Bind (or rebind) a conversation to an upstream. `created_at` is
    /// preserved across rebinds; `last_accessed` always moves forward.
    pub async fn bind(
        &self,
        conversation_id: &str,
        logical_model: &str,
        provider_id: &str,
        model_id: &str,
    ) -> Result<Session> {
        let now = now_epoch_secs();
        let existing = self.get(conversation_id).await?;

        let session = Session {
            conversation_id: conversation_id.to_string(),
            logical_model: logical_model.to_string(),
            provider_id: provider_id.to_string(),
            model_id: model_id.to_string(),
            created_at: existing.as_ref().map(|s| s.created_at).unwrap_or(now),
            last_accessed: now.max(existing.as_ref().map(|s| s.last_accessed).unwrap_or(now)),
            message_count: existing.map(|s| s.message_count.saturating_add(1)).unwrap_or(1),
        };

        self.persist(&session).await?;
        Ok(session)
    }

    /// Update `last_accessed` (and bump `message_count` by `inc_messages`)
    /// without changing the bound upstream. Negative increments are clamped
    /// to 0 so `message_count` never moves backwards.
    pub async fn touch(&self, conversation_id: &str, inc_messages: i64) -> Result<Option<Session>> {
        let Some(mut session) = self.get(conversation_id).await? else {
            return Ok(None);
        };
        session.last_accessed = now_epoch_secs().max(session.last_accessed);
        session.message_count = session.message_count.saturating_add(inc_messages.max(0) as u32);
        self.persist(&session).await?;
        Ok(Some(session))
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.cache.delete(&Session::cache_key(conversation_id)).await
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        self.cache
            .set(&Session::cache_key(&session.conversation_id), &json, Some(SESSION_TTL))
            .await
    }
}
