//! Classifies a request's session as valid, invalid, or hijacked.
//!
//! Decision order (first match wins):
//! 1. empty token            -> [`Verification::Unauthenticated`]
//! 2. empty fingerprint      -> [`VerifyError::FingerprintMissing`]
//! 3. store lookup fails     -> [`Verification::StoreUnavailable`]
//! 4. stored == presented    -> [`Verification::Matched`]
//! 5. nothing stored         -> [`Verification::Unbound`]
//! 6. stored != presented    -> [`Verification::Hijacked`]
//!
//! The verifier only reads from the store.

use super::token::{constant_time_eq, log_prefix};
use crate::store::{SessionStore, StoreError};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

/// The only failure that crosses the verifier boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The caller sent no fingerprint: a client-side defect, not an attack.
    #[error("Error calculating fingerprint: no fingerprint supplied")]
    FingerprintMissing,
}

/// Outcome of verifying a session against its bound fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// No session token was presented.
    Unauthenticated,
    /// The store could not be read. Fails closed without a hijack claim.
    StoreUnavailable(StoreError),
    /// The presented fingerprint equals the bound one.
    Matched { fingerprint: String },
    /// No binding on record; tolerated as valid.
    Unbound,
    /// A binding exists and the presented fingerprint differs from it.
    Hijacked { bound: String },
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Matched { .. } | Self::Unbound)
    }

    pub fn is_hijacked(&self) -> bool {
        matches!(self, Self::Hijacked { .. })
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::StoreUnavailable(_) => "store_error",
            Self::Matched { .. } => "matched",
            Self::Unbound => "unbound",
            Self::Hijacked { .. } => "hijacked",
        }
    }

    /// Wire shape of this outcome.
    pub fn to_record(&self) -> VerificationRecord {
        match self {
            Self::Unauthenticated | Self::StoreUnavailable(_) => VerificationRecord {
                valid: false,
                hijacked: None,
                received_fingerprint: None,
            },
            Self::Matched { fingerprint } => VerificationRecord {
                valid: true,
                hijacked: Some(false),
                received_fingerprint: Some(Some(fingerprint.clone())),
            },
            Self::Unbound => VerificationRecord {
                valid: true,
                hijacked: Some(false),
                received_fingerprint: Some(None),
            },
            Self::Hijacked { bound } => VerificationRecord {
                valid: false,
                hijacked: Some(true),
                received_fingerprint: Some(Some(bound.clone())),
            },
        }
    }
}

/// JSON record returned to HTTP callers.
///
/// `hijacked` and `receivedFingerprint` are omitted for unauthenticated and
/// store-failure outcomes; `receivedFingerprint` is `null` for an unbound
/// session. Check `valid` first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hijacked: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub received_fingerprint: Option<Option<String>>,
}

/// Distinguish an explicit `null` from a missing field.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Verify `auth_token` against the fingerprint bound to it in `store`.
pub async fn verify<S>(
    auth_token: &str,
    fingerprint: &str,
    store: &S,
) -> Result<Verification, VerifyError>
where
    S: SessionStore + ?Sized,
{
    if auth_token.is_empty() {
        tracing::debug!("Verify: no session token presented");
        return Ok(Verification::Unauthenticated);
    }

    if fingerprint.is_empty() {
        tracing::warn!(token = log_prefix(auth_token), "Verify: fingerprint missing");
        return Err(VerifyError::FingerprintMissing);
    }

    let stored = match store.get(auth_token).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(
                store = store.name(),
                token = log_prefix(auth_token),
                "Verify: binding lookup failed, failing closed: {e}"
            );
            return Ok(Verification::StoreUnavailable(e));
        }
    };

    let verification = match stored {
        Some(bound) if constant_time_eq(bound.as_bytes(), fingerprint.as_bytes()) => {
            Verification::Matched { fingerprint: bound }
        }
        None => Verification::Unbound,
        Some(bound) => Verification::Hijacked { bound },
    };

    if verification.is_hijacked() {
        tracing::warn!(
            store = store.name(),
            token = log_prefix(auth_token),
            "Session hijack suspected: fingerprint does not match binding"
        );
    } else {
        tracing::debug!(
            token = log_prefix(auth_token),
            outcome = verification.label(),
            "Session verified"
        );
    }

    Ok(verification)
}

/// Verifier over an injected store handle.
#[derive(Clone)]
pub struct SessionVerifier {
    store: Arc<dyn SessionStore>,
}

impl SessionVerifier {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn verify(
        &self,
        auth_token: &str,
        fingerprint: &str,
    ) -> Result<Verification, VerifyError> {
        verify(auth_token, fingerprint, self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store that counts writes.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }
    }

    struct OutageStore;

    #[async_trait]
    impl SessionStore for OutageStore {
        fn name(&self) -> &str {
            "outage"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("READONLY You can't write against a replica".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("READONLY You can't write against a replica".into()))
        }
    }

    #[tokio::test]
    async fn matching_fingerprint_is_valid() {
        let store = MemoryStore::new();
        bind("abc123", "fp-X", &store).await;

        let result = verify("abc123", "fp-X", &store).await.unwrap();
        assert_eq!(
            result,
            Verification::Matched {
                fingerprint: "fp-X".into()
            }
        );
        assert_eq!(
            result.to_record(),
            VerificationRecord {
                valid: true,
                hijacked: Some(false),
                received_fingerprint: Some(Some("fp-X".into())),
            }
        );
    }

    #[tokio::test]
    async fn mismatched_fingerprint_is_hijacked() {
        let store = MemoryStore::new();
        bind("abc123", "fp-X", &store).await;

        let result = verify("abc123", "fp-Y", &store).await.unwrap();
        assert!(result.is_hijacked());
        assert!(!result.is_valid());
        assert_eq!(
            result.to_record(),
            VerificationRecord {
                valid: false,
                hijacked: Some(true),
                received_fingerprint: Some(Some("fp-X".into())),
            }
        );
    }

    #[tokio::test]
    async fn empty_token_is_unauthenticated_regardless_of_store() {
        let store = MemoryStore::new();
        bind("abc123", "fp", &store).await;

        let result = verify("", "fp", &store).await.unwrap();
        assert_eq!(result, Verification::Unauthenticated);

        // Even a broken store is never consulted.
        let result = verify("", "", &OutageStore).await.unwrap();
        assert_eq!(result, Verification::Unauthenticated);
    }

    #[tokio::test]
    async fn empty_fingerprint_is_an_error() {
        let store = MemoryStore::new();
        let err = verify("abc123", "", &store).await.unwrap_err();
        assert_eq!(err, VerifyError::FingerprintMissing);
    }

    #[tokio::test]
    async fn unbound_token_is_tolerated() {
        let store = MemoryStore::new();
        let result = verify("never-bound", "fp", &store).await.unwrap();

        assert_eq!(result, Verification::Unbound);
        let record = result.to_record();
        assert!(record.valid);
        assert_eq!(record.hijacked, Some(false));
        assert_eq!(record.received_fingerprint, Some(None));
    }

    #[tokio::test]
    async fn rebind_last_write_wins() {
        let store = MemoryStore::new();
        bind("t", "f1", &store).await;
        bind("t", "f2", &store).await;

        assert!(verify("t", "f2", &store).await.unwrap().is_valid());
        assert!(verify("t", "f1", &store).await.unwrap().is_hijacked());
    }

    #[tokio::test]
    async fn store_outage_fails_closed_without_hijack() {
        let result = verify("abc123", "fp", &OutageStore).await.unwrap();

        assert!(matches!(result, Verification::StoreUnavailable(_)));
        assert!(!result.is_hijacked());
        assert_eq!(
            result.to_record(),
            VerificationRecord {
                valid: false,
                hijacked: None,
                received_fingerprint: None,
            }
        );
    }

    #[tokio::test]
    async fn verify_never_writes() {
        let store = CountingStore::default();
        store.set("bound", "fp").await.unwrap();
        store.writes.store(0, Ordering::SeqCst);

        let _ = verify("", "fp", &store).await;
        let _ = verify("bound", "", &store).await;
        let _ = verify("bound", "fp", &store).await;
        let _ = verify("bound", "other", &store).await;
        let _ = verify("unbound", "fp", &store).await;

        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn session_verifier_uses_injected_store() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        store.set("hash", "fp").await.unwrap();

        let verifier = SessionVerifier::new(store);
        assert!(verifier.verify("hash", "fp").await.unwrap().is_valid());
    }

    #[test]
    fn record_json_shapes() {
        let json = serde_json::to_value(Verification::Unauthenticated.to_record()).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false}));

        let json = serde_json::to_value(Verification::Unbound.to_record()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"valid": true, "hijacked": false, "receivedFingerprint": null})
        );

        let hijacked = Verification::Hijacked {
            bound: "fp-X".into(),
        };
        let json = serde_json::to_value(hijacked.to_record()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"valid": false, "hijacked": true, "receivedFingerprint": "fp-X"})
        );
    }

    #[test]
    fn record_parses_null_and_missing_fingerprint_differently() {
        let unbound: VerificationRecord = serde_json::from_str(
            r#"{"valid":true,"hijacked":false,"receivedFingerprint":null}"#,
        )
        .unwrap();
        assert_eq!(unbound.received_fingerprint, Some(None));

        let bare: VerificationRecord = serde_json::from_str(r#"{"valid":false}"#).unwrap();
        assert_eq!(bare.received_fingerprint, None);
        assert_eq!(bare.hijacked, None);
    }
}
