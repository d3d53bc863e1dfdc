//! In-memory binding store with optional TTL-based expiry.
//!
//! Bindings live only as long as the process. Expired entries are
//! treated as absent on read and removed by [`MemoryStore::sweep_expired`].

use super::{SessionStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Internal entry with expiry tracking.
struct BindingSlot {
    fingerprint: String,
    expires_at: Option<Instant>,
}

impl BindingSlot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Process-local binding store.
#[derive(Default)]
pub struct MemoryStore {
    /// token_hash -> slot
    slots: Mutex<HashMap<String, BindingSlot>>,
    /// `None` keeps bindings until the process exits.
    ttl: Option<Duration>,
}

impl MemoryStore {
    /// Create a store whose bindings never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose bindings expire `ttl` after their last write.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Sweep expired bindings. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        before - slots.len()
    }

    /// Number of stored bindings, expired or not (for diagnostics).
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock();
        Ok(slots
            .get(key)
            .filter(|slot| slot.is_live(Instant::now()))
            .map(|slot| slot.fingerprint.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.slots.lock().insert(
            key.to_owned(),
            BindingSlot {
                fingerprint: value.to_owned(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(self.sweep_expired() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_none_for_unknown_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let store = MemoryStore::new();
        store.set("hash", "fp-1").await.unwrap();
        store.set("hash", "fp-2").await.unwrap();

        assert_eq!(store.get("hash").await.unwrap().as_deref(), Some("fp-2"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn expired_binding_reads_as_absent() {
        let store = MemoryStore::with_ttl(Some(Duration::from_millis(20)));
        store.set("hash", "fp").await.unwrap();
        assert!(store.get("hash").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("hash").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_bindings() {
        let store = MemoryStore::with_ttl(Some(Duration::from_millis(20)));
        store.set("old", "fp").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.set("fresh", "fp").await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn no_ttl_never_expires() {
        let store = MemoryStore::with_ttl(None);
        store.set("hash", "fp").await.unwrap();
        assert_eq!(store.sweep_expired(), 0);
        assert!(store.get("hash").await.unwrap().is_some());
    }
}
