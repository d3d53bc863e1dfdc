//! HTTP client for a hijack-guarded auth API.
//!
//! Every call is `POST {base_url}/api{path}` with a JSON body. The session
//! cookie set by `/login` is kept in the client's cookie jar and replayed on
//! later calls, so `verify_session` runs against the logged-in session.

use crate::binding::VerificationRecord;
use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Failure calling the auth API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer; `body` is the raw response text.
    #[error("server responded {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("could not compute fingerprint: {0}")]
    Fingerprint(String),
}

/// Produces the device fingerprint sent with login and verify calls.
#[async_trait]
pub trait FingerprintSource: Send + Sync {
    async fn fingerprint(&self) -> Result<String, ClientError>;
}

/// A fingerprint fixed up front, e.g. computed once by the embedding app.
#[derive(Debug, Clone)]
pub struct StaticFingerprint(String);

impl StaticFingerprint {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self(fingerprint.into())
    }
}

#[async_trait]
impl FingerprintSource for StaticFingerprint {
    async fn fingerprint(&self) -> Result<String, ClientError> {
        if self.0.is_empty() {
            return Err(ClientError::Fingerprint("empty fingerprint".into()));
        }
        Ok(self.0.clone())
    }
}

pub struct SessionClient {
    base_url: String,
    http: reqwest::Client,
    fingerprints: Arc<dyn FingerprintSource>,
}

impl SessionClient {
    pub fn new(
        base_url: impl Into<String>,
        fingerprints: Arc<dyn FingerprintSource>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            fingerprints,
        })
    }

    pub fn from_config(
        config: &ClientConfig,
        fingerprints: Arc<dyn FingerprintSource>,
    ) -> anyhow::Result<Self> {
        Self::new(config.base_url.clone(), fingerprints)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Log in; the current fingerprint travels with the credentials so the
    /// server can bind the new session to it.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<serde_json::Value, ClientError> {
        let fingerprint = self.fingerprints.fingerprint().await?;
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "fingerprint": fingerprint,
        });
        self.post("/login", &body).await
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<serde_json::Value, ClientError> {
        let body = serde_json::json!({
            "name": name,
            "email": email,
            "password": password,
        });
        self.post("/signup", &body).await
    }

    /// Ask the server whether the current session still matches this device.
    pub async fn verify_session(&self) -> Result<VerificationRecord, ClientError> {
        let fingerprint = self.fingerprints.fingerprint().await?;
        let body = serde_json::json!({ "fingerprint": fingerprint });
        let record: VerificationRecord = self.post("/verify", &body).await?;
        if record.hijacked == Some(true) {
            tracing::warn!("Server reports this session as hijacked");
        }
        Ok(record)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/api{}", self.base_url, path);
        let resp = self.http.post(&url).json(body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(%status, path, "Auth API call failed");
            return Err(ClientError::Status { status, body });
        }

        Ok(resp.json().await?)
    }
}
