//! Jittered exponential backoff for `StorageBusy`: base 100ms, factor
//! 2, cap 1s, 3 attempts by default.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use shared_context_protocol::{AgentMemory, AuditEvent, CoreError, ErrorCode, CoreResult, Message, SecureToken, Session};
use tracing::warn;

use crate::driver::{NewMessage, Storage};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            factor: 2,
            cap: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Environments flagged as CI reduce concurrency fan-out; callers that
    /// need CI-friendly retries can shrink attempts accordingly.
    #[must_use]
    pub fn for_ci() -> Self {
        Self {
            max_attempts: 2,
            ..Self::default()
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt);
        let raw = self.base.saturating_mul(multiplier).min(self.cap);
        let jitter_ms = rand::thread_rng().gen_range(0..=raw.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Retry `op` while it reports `StorageBusy`, using jittered exponential
/// backoff. Any other error (or exhaustion of attempts) is returned as-is.
pub async fn retry_busy<F, Fut, T>(policy: RetryPolicy, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.code == ErrorCode::StorageBusy && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, delay_ms = %delay.as_millis(), "storage busy, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Wraps any `Storage` driver so every call retries on `StorageBusy` with
/// jittered backoff. `shared_context_storage::connect` returns stores
/// wrapped in this by default; drivers themselves stay retry-unaware.
pub struct RetryingStorage<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingStorage<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: Storage> Storage for RetryingStorage<S> {
    async fn migrate(&self) -> CoreResult<()> {
        retry_busy(self.policy, || self.inner.migrate()).await
    }

    async fn ping(&self) -> CoreResult<()> {
        retry_busy(self.policy, || self.inner.ping()).await
    }

    async fn insert_session(&self, session: &Session) -> CoreResult<()> {
        retry_busy(self.policy, || self.inner.insert_session(session)).await
    }

    async fn get_session(&self, id: &str) -> CoreResult<Option<Session>> {
        retry_busy(self.policy, || self.inner.get_session(id)).await
    }

    async fn list_sessions_for_agent(&self, agent_id: &str, offset: i64, limit: i64) -> CoreResult<Vec<Session>> {
        retry_busy(self.policy, || self.inner.list_sessions_for_agent(agent_id, offset, limit)).await
    }

    async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        retry_busy(self.policy, || self.inner.touch_session(id, at)).await
    }

    async fn delete_session(&self, id: &str) -> CoreResult<()> {
        retry_busy(self.policy, || self.inner.delete_session(id)).await
    }

    async fn insert_message(&self, message: &NewMessage) -> CoreResult<i64> {
        retry_busy(self.policy, || self.inner.insert_message(message)).await
    }

    async fn get_message_by_id(&self, id: i64) -> CoreResult<Option<Message>> {
        retry_busy(self.policy, || self.inner.get_message_by_id(id)).await
    }

    async fn get_parent_session(&self, parent_message_id: i64) -> CoreResult<Option<String>> {
        retry_busy(self.policy, || self.inner.get_parent_session(parent_message_id)).await
    }

    async fn list_messages(&self, session_id: &str) -> CoreResult<Vec<Message>> {
        retry_busy(self.policy, || self.inner.list_messages(session_id)).await
    }

    async fn list_messages_page(&self, session_id: &str, offset: i64, limit: i64) -> CoreResult<Vec<Message>> {
        retry_busy(self.policy, || self.inner.list_messages_page(session_id, offset, limit)).await
    }

    async fn upsert_memory(&self, record: &AgentMemory, overwrite: bool) -> CoreResult<bool> {
        retry_busy(self.policy, || self.inner.upsert_memory(record, overwrite)).await
    }

    async fn get_memory(&self, agent_id: &str, session_id: Option<&str>, key: &str) -> CoreResult<Option<AgentMemory>> {
        retry_busy(self.policy, || self.inner.get_memory(agent_id, session_id, key)).await
    }

    async fn list_memory(&self, agent_id: &str, session_id: Option<&str>, prefix: Option<&str>) -> CoreResult<Vec<AgentMemory>> {
        retry_busy(self.policy, || self.inner.list_memory(agent_id, session_id, prefix)).await
    }

    async fn delete_memory(&self, agent_id: &str, session_id: Option<&str>, key: &str) -> CoreResult<bool> {
        retry_busy(self.policy, || self.inner.delete_memory(agent_id, session_id, key)).await
    }

    async fn delete_expired_memory(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        retry_busy(self.policy, || self.inner.delete_expired_memory(now)).await
    }

    async fn delete_memory_for_session(&self, session_id: &str) -> CoreResult<u64> {
        retry_busy(self.policy, || self.inner.delete_memory_for_session(session_id)).await
    }

    async fn insert_token(&self, token: &SecureToken) -> CoreResult<()> {
        retry_busy(self.policy, || self.inner.insert_token(token)).await
    }

    async fn get_token(&self, token_id: &str) -> CoreResult<Option<SecureToken>> {
        retry_busy(self.policy, || self.inner.get_token(token_id)).await
    }

    async fn delete_token(&self, token_id: &str) -> CoreResult<()> {
        retry_busy(self.policy, || self.inner.delete_token(token_id)).await
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        retry_busy(self.policy, || self.inner.delete_expired_tokens(now)).await
    }

    async fn any_tokens_exist(&self) -> CoreResult<bool> {
        retry_busy(self.policy, || self.inner.any_tokens_exist()).await
    }

    async fn append_audit(&self, event: &AuditEvent) -> CoreResult<()> {
        retry_busy(self.policy, || self.inner.append_audit(event)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let result = retry_busy(RetryPolicy::default(), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(CoreError::storage_busy(10))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), CoreError> = retry_busy(RetryPolicy::default(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::storage_busy(10))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_busy_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), CoreError> = retry_busy(RetryPolicy::default(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::not_found("gone"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
