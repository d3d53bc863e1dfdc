//! Deadline wrapper for any [`SessionStore`].

use super::{SessionStore, StoreError};
use async_trait::async_trait;
use std::time::Duration;

/// Bounds every store round-trip by a fixed deadline.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: SessionStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<S: SessionStore> SessionStore for TimeoutStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        tokio::time::timeout(self.timeout, self.inner.get(key))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tokio::time::timeout(self.timeout, self.inner.set(key, value))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.inner.purge_expired().await
    }
}
