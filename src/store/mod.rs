//! Key-value persistence for session bindings.
//!
//! The binding core only needs two operations over a flat string keyspace:
//! `get(token_hash)` and `set(token_hash, fingerprint)`. Everything behind
//! [`SessionStore`] is opaque to the binder and verifier.
//!
//! ## Backends
//! - [`MemoryStore`]: in-process map with optional TTL (tests, single node)
//! - [`SqliteStore`]: durable single-table store, WAL mode
//! - `RedisStore`: shared store for multi-node gateways (`store-redis` feature)
//!
//! Every backend opened through [`open_store`] is wrapped in a
//! [`TimeoutStore`] so a hung backend surfaces as [`StoreError::Timeout`].

pub mod memory;
#[cfg(feature = "store-redis")]
pub mod redis;
pub mod sqlite;
pub mod timeout;

pub use memory::MemoryStore;
#[cfg(feature = "store-redis")]
pub use self::redis::RedisStore;
pub use sqlite::SqliteStore;
pub use timeout::TimeoutStore;

use crate::config::{StoreBackend, StoreConfig};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Failure talking to the binding store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store did not answer within the configured deadline.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store could not be reached (connection refused, pool closed).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with an error.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Flat string-to-string store keyed by session-token hash.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name, for logs and `/health`.
    fn name(&self) -> &str;

    /// Fetch the fingerprint bound to `key`, `None` when nothing is bound.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Upsert the fingerprint for `key`. Last write wins.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Drop bindings past their TTL. Backends that expire on their own
    /// report 0.
    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

#[async_trait]
impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        (**self).purge_expired().await
    }
}

/// Build the configured backend, wrapped in a [`TimeoutStore`].
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>> {
    let ttl = config.binding_ttl();
    let timeout = Duration::from_millis(config.timeout_ms);

    let store: Arc<dyn SessionStore> = match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Binding store: in-memory");
            Arc::new(TimeoutStore::new(MemoryStore::with_ttl(ttl), timeout))
        }
        StoreBackend::Sqlite => {
            let path = config.resolved_sqlite_path()?;
            tracing::info!(path = %path.display(), "Binding store: sqlite");
            Arc::new(TimeoutStore::new(SqliteStore::open(&path, ttl)?, timeout))
        }
        #[cfg(feature = "store-redis")]
        StoreBackend::Redis => {
            tracing::info!("Binding store: redis");
            let store = RedisStore::connect(&config.redis_url, &config.key_prefix, ttl).await?;
            Arc::new(TimeoutStore::new(store, timeout))
        }
        #[cfg(not(feature = "store-redis"))]
        StoreBackend::Redis => {
            anyhow::bail!(
                "store.backend = \"redis\" requires building with `--features store-redis`"
            );
        }
    };

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_messages_are_descriptive() {
        let err = StoreError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("timed out"));

        let err = StoreError::Unavailable("connection refused".into());
        assert_eq!(err.to_string(), "store unavailable: connection refused");
    }

    #[tokio::test]
    async fn arc_store_delegates_to_inner() {
        let store = Arc::new(MemoryStore::new());
        store.set("k", "v").await.unwrap();

        let shared: Arc<dyn SessionStore> = store.clone();
        assert_eq!(shared.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(shared.name(), "memory");
    }

    #[tokio::test]
    async fn open_store_builds_memory_backend() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = open_store(&config).await.unwrap();
        store.set("hash", "fp").await.unwrap();
        assert_eq!(store.get("hash").await.unwrap().as_deref(), Some("fp"));
    }

    #[tokio::test]
    async fn open_store_builds_sqlite_backend() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            sqlite_path: Some(tmp.path().join("bindings.db")),
            ..StoreConfig::default()
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[cfg(not(feature = "store-redis"))]
    #[tokio::test]
    async fn open_store_rejects_redis_without_feature() {
        let config = StoreConfig {
            backend: StoreBackend::Redis,
            ..StoreConfig::default()
        };
        assert!(open_store(&config).await.is_err());
    }
}
