//! Retry decorator for the `ConnectionLoss` transient-failure policy
//! (`spec.md` §4.1: "transient; callers retry with exponential backoff up
//! to a configured ceiling").
//!
//! Wraps any [`CoordinationStore`] implementation. Every call is retried
//! with exponential backoff when the inner store reports
//! [`CoordinationError::ConnectionLoss`]; all other errors (including
//! `VersionMismatch`, which callers must re-read-and-retry themselves per
//! §7's "Stale-state-version" handling) pass through unchanged.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{CoordinationError, Result},
    session::SessionState,
    CoordinationStore, NodeVersion, Watch,
};

/// Backoff ceiling for [`RetryingStore`] (`spec.md` §4.1).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-indexed), doubling each time up
    /// to `max_delay`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Decorates a [`CoordinationStore`] with `ConnectionLoss` retry-with-backoff.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

/// Runs `op` with `policy`'s retry-with-backoff applied to
/// `ConnectionLoss` failures only.
async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(CoordinationError::ConnectionLoss(msg)) if attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(attempt, ?delay, error = %msg, "coordination connection loss, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[async_trait]
impl<S: CoordinationStore> CoordinationStore for RetryingStore<S> {
    async fn get(&self, path: &str) -> Result<(Vec<u8>, NodeVersion)> {
        with_retry(&self.policy, || self.inner.get(path)).await
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: NodeVersion,
    ) -> Result<NodeVersion> {
        with_retry(&self.policy, || {
            self.inner.set_data(path, data.clone(), expected_version)
        })
        .await
    }

    async fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> Result<()> {
        with_retry(&self.policy, || self.inner.create_ephemeral(path, data.clone())).await
    }

    async fn exists(&self, path: &str) -> Result<Option<NodeVersion>> {
        with_retry(&self.policy, || self.inner.exists(path)).await
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        with_retry(&self.policy, || self.inner.children(path)).await
    }

    async fn watch(&self, path: &str) -> Result<Watch> {
        with_retry(&self.policy, || self.inner.watch(path)).await
    }

    fn session_state(&self) -> SessionState {
        self.inner.session_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    #[tokio::test]
    async fn delegates_to_inner_store() {
        let store = RetryingStore::new(InMemoryStore::new());
        let v = store
            .set_data("/collections/c1/state.json", b"v1".to_vec(), NodeVersion::INITIAL)
            .await
            .unwrap();
        assert_eq!(v, NodeVersion::new(1));
        let (data, version) = store.get("/collections/c1/state.json").await.unwrap();
        assert_eq!(data, b"v1");
        assert_eq!(version, v);
    }

    #[test]
    fn delay_doubles_up_to_ceiling() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            max_attempts: 10,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(4), Duration::from_millis(350));
    }
}
