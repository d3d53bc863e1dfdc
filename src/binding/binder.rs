//! Records which fingerprint a session was established from.
//!
//! Binding is best-effort: a store failure is logged and swallowed so it
//! can never fail the login or signup that triggered it. The returned
//! [`BindOutcome`] says what happened, but callers are free to ignore it.

use super::token::log_prefix;
use crate::store::{SessionStore, StoreError};
use std::sync::Arc;

/// Why a bind request was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindSkip {
    EmptyTokenHash,
    EmptyFingerprint,
}

/// Result of a best-effort bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The store acknowledged the write.
    Bound,
    /// The store failed; the error was logged and swallowed.
    Recovered(StoreError),
    /// Empty input; nothing was written.
    Skipped(BindSkip),
}

impl BindOutcome {
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound)
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bound => "bound",
            Self::Recovered(_) => "store_error",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// Upsert `token_hash -> fingerprint` in `store`. Never fails.
pub async fn bind<S>(token_hash: &str, fingerprint: &str, store: &S) -> BindOutcome
where
    S: SessionStore + ?Sized,
{
    if token_hash.is_empty() {
        tracing::warn!("Bind skipped: empty token hash");
        return BindOutcome::Skipped(BindSkip::EmptyTokenHash);
    }
    if fingerprint.is_empty() {
        tracing::warn!(token = log_prefix(token_hash), "Bind skipped: empty fingerprint");
        return BindOutcome::Skipped(BindSkip::EmptyFingerprint);
    }

    match store.set(token_hash, fingerprint).await {
        Ok(()) => {
            tracing::debug!(
                store = store.name(),
                token = log_prefix(token_hash),
                "Session bound to fingerprint"
            );
            BindOutcome::Bound
        }
        Err(e) => {
            tracing::error!(
                store = store.name(),
                token = log_prefix(token_hash),
                "Failed to bind session fingerprint: {e}"
            );
            BindOutcome::Recovered(e)
        }
    }
}

/// Binder over an injected store handle.
#[derive(Clone)]
pub struct SessionBinder {
    store: Arc<dyn SessionStore>,
}

impl SessionBinder {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn bind(&self, token_hash: &str, fingerprint: &str) -> BindOutcome {
        bind(token_hash, fingerprint, self.store.as_ref()).await
    }
}
