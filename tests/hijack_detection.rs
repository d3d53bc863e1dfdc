//! End-to-end hijack detection through the public API.

use async_trait::async_trait;
use hijackguard::binding::BindSkip;
use hijackguard::store::TimeoutStore;
use hijackguard::{
    bind, hash_token, verify, BindOutcome, MemoryStore, SessionBinder, SessionStore,
    SessionVerifier, SqliteStore, StoreError, Verification, VerifyError,
};
use std::sync::Arc;
use std::time::Duration;

struct HangingStore;

#[async_trait]
impl SessionStore for HangingStore {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        std::future::pending().await
    }
}

fn record_json(verification: &Verification) -> serde_json::Value {
    serde_json::to_value(verification.to_record()).unwrap()
}

async fn login_then_verify_scenario(store: Arc<dyn SessionStore>) {
    let binder = SessionBinder::new(Arc::clone(&store));
    let verifier = SessionVerifier::new(store);

    assert_eq!(binder.bind("abc123", "fp-X").await, BindOutcome::Bound);

    let same_device = verifier.verify("abc123", "fp-X").await.unwrap();
    assert_eq!(
        record_json(&same_device),
        serde_json::json!({"valid": true, "hijacked": false, "receivedFingerprint": "fp-X"})
    );

    let other_device = verifier.verify("abc123", "fp-Y").await.unwrap();
    assert_eq!(
        record_json(&other_device),
        serde_json::json!({"valid": false, "hijacked": true, "receivedFingerprint": "fp-X"})
    );
}

#[tokio::test]
async fn memory_store_detects_hijack() {
    login_then_verify_scenario(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn sqlite_store_detects_hijack() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = SqliteStore::open(&tmp.path().join("bindings.db"), None).unwrap();
    login_then_verify_scenario(Arc::new(store)).await;
}

#[tokio::test]
async fn rebinding_after_relogin_moves_the_session() {
    let store = MemoryStore::new();
    let key = hash_token("session-token");

    bind(&key, "laptop", &store).await;
    bind(&key, "phone", &store).await;

    assert!(verify(&key, "phone", &store).await.unwrap().is_valid());
    assert!(verify(&key, "laptop", &store).await.unwrap().is_hijacked());
}

#[tokio::test]
async fn unbound_token_is_tolerated() {
    let store = MemoryStore::new();
    let verification = verify("never-bound", "fp", &store).await.unwrap();
    assert_eq!(verification, Verification::Unbound);
    assert_eq!(
        record_json(&verification),
        serde_json::json!({"valid": true, "hijacked": false, "receivedFingerprint": null})
    );
}

#[tokio::test]
async fn missing_token_and_missing_fingerprint() {
    let store = MemoryStore::new();
    bind("abc123", "fp-X", &store).await;

    let verification = verify("", "fp-X", &store).await.unwrap();
    assert_eq!(record_json(&verification), serde_json::json!({"valid": false}));

    assert_eq!(
        verify("abc123", "", &store).await,
        Err(VerifyError::FingerprintMissing)
    );
}

#[tokio::test]
async fn empty_bind_inputs_are_skipped() {
    let store = MemoryStore::new();
    assert_eq!(
        bind("", "fp", &store).await,
        BindOutcome::Skipped(BindSkip::EmptyTokenHash)
    );
    assert_eq!(
        bind("abc", "", &store).await,
        BindOutcome::Skipped(BindSkip::EmptyFingerprint)
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn hung_store_fails_closed_without_hijack_claim() {
    let store = TimeoutStore::new(HangingStore, Duration::from_millis(20));

    let outcome = bind("abc123", "fp-X", &store).await;
    assert!(matches!(
        outcome,
        BindOutcome::Recovered(StoreError::Timeout(_))
    ));

    let verification = verify("abc123", "fp-X", &store).await.unwrap();
    assert!(!verification.is_valid());
    assert!(!verification.is_hijacked());
    assert_eq!(record_json(&verification), serde_json::json!({"valid": false}));
}
