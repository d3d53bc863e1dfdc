//! Axum-based HTTP gateway in front of the binder and verifier.
//!
//! Routes:
//! - `GET  /health`      liveness + store backend name
//! - `GET  /metrics`     Prometheus text exposition
//! - `POST /api/bind`    record `tokenHash -> fingerprint` (best-effort, 202)
//! - `POST /api/verify`  verify the caller's session against its fingerprint
//!
//! Hardening:
//! - Request body size limits (64KB max)
//! - Request timeouts (30s)
//! - Per-client sliding-window rate limit on `/api/verify`, keyed by peer
//!   address unless forwarded headers are explicitly trusted
//! - `/api/bind` requires a shared secret and is disabled without one

use crate::binding::token::constant_time_eq;
use crate::binding::{hash_token, SessionBinder, SessionVerifier, VerifyError};
use crate::config::{Config, GatewayConfig};
use crate::metrics::GatewayMetrics;
use crate::store::{open_store, SessionStore};
use anyhow::Result;
use axum::{
    extract::{ConnectInfo, State},
    http::{header, Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Sliding window used by gateway rate limiting.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
/// Header carrying the shared secret for `/api/bind`.
pub const BIND_SECRET_HEADER: &str = "x-binding-secret";

/// Idle clients are dropped from the limiter at most this often.
const LIMITER_SWEEP_EVERY: Duration = Duration::from_secs(300);

/// How often expired bindings are purged from the store.
const BINDING_PURGE_INTERVAL_SECS: u64 = 600;

/// Per-client request log for `/api/verify`.
#[derive(Debug)]
struct VerifyRateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    hits: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl VerifyRateLimiter {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(LimiterState {
                hits: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Record a request from `client`; `false` once it is over the limit.
    fn check(&self, client: &str) -> bool {
        if self.limit == 0 {
            return true;
        }

        let now = Instant::now();
        let window = self.window;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if now.duration_since(state.last_sweep) >= LIMITER_SWEEP_EVERY {
            state
                .hits
                .retain(|_, log| log.back().is_some_and(|t| now.duration_since(*t) < window));
            state.last_sweep = now;
        }

        let log = state.hits.entry(client.to_owned()).or_default();
        while log.front().is_some_and(|t| now.duration_since(*t) >= window) {
            log.pop_front();
        }

        if log.len() >= self.limit as usize {
            return false;
        }
        log.push_back(now);
        true
    }
}

/// First address in `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let first_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    first_value("x-forwarded-for")
        .or_else(|| first_value("x-real-ip"))
        .map(str::to_owned)
}

/// Rate-limit key: the TCP peer, or the proxy-reported client when the
/// gateway is configured to trust forwarding headers.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(client) = forwarded_client(headers) {
            return client;
        }
    }
    peer.map_or_else(|| "unknown".into(), |addr| addr.ip().to_string())
}

/// Session token from `Authorization: Bearer` or, failing that, the auth cookie.
fn session_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim())
        .filter(|t| !t.is_empty())
}

/// Refuse anything that is not loopback unless explicitly allowed.
fn is_public_bind(host: &str) -> bool {
    !matches!(host, "127.0.0.1" | "localhost" | "::1" | "[::1]") && !host.starts_with("127.")
}

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub binder: SessionBinder,
    pub verifier: SessionVerifier,
    pub store: Arc<dyn SessionStore>,
    pub metrics: Arc<GatewayMetrics>,
    /// SHA-256 hash of `X-Binding-Secret` (hex-encoded), never plaintext.
    pub bind_secret_hash: Option<Arc<str>>,
    /// Cookie consulted when no bearer token is sent.
    pub auth_cookie: Arc<str>,
    /// Key the verify rate limit on `X-Forwarded-For` / `X-Real-IP`.
    pub trust_forwarded_headers: bool,
    verify_limiter: Arc<VerifyRateLimiter>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: &GatewayConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        let bind_secret_hash = gateway
            .bind_secret
            .as_deref()
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
            .map(|secret| Arc::from(hash_token(secret)));

        Self {
            binder: SessionBinder::new(Arc::clone(&store)),
            verifier: SessionVerifier::new(Arc::clone(&store)),
            store,
            metrics,
            bind_secret_hash,
            auth_cookie: Arc::from(gateway.auth_cookie.as_str()),
            trust_forwarded_headers: gateway.trust_forwarded_headers,
            verify_limiter: Arc::new(VerifyRateLimiter::new(
                gateway.verify_per_minute,
                Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            )),
        }
    }
}

/// Build the gateway router with middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/api/bind", post(handle_bind))
        .route("/api/verify", post(handle_verify))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    // ── Security: refuse public bind without explicit opt-in ──
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "Refusing to bind to {host}: the gateway would be reachable from the network.\n\
             Fix: use --host 127.0.0.1 (default) behind a reverse proxy, or set\n\
             [gateway] allow_public_bind = true in config.toml."
        );
    }

    let store = open_store(&config.store).await?;
    let metrics = Arc::new(GatewayMetrics::new()?);
    let state = AppState::new(Arc::clone(&store), &config.gateway, metrics);

    if state.bind_secret_hash.is_none() {
        tracing::warn!("No gateway.bind_secret configured: /api/bind is disabled");
    }

    // Periodic purge of expired bindings
    {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(BINDING_PURGE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Purged expired bindings"),
                    Err(e) => tracing::warn!("Binding purge failed: {e}"),
                }
            }
        });
    }

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();
    tracing::info!(
        store = store.name(),
        "Gateway listening on http://{host}:{actual_port}"
    );

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health: always public, leaks nothing but the backend name
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "store": state.store.name(),
    }))
}

/// GET /metrics: Prometheus text format
async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to render metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Request body for `/api/bind`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindBody {
    pub token_hash: String,
    pub fingerprint: String,
}

/// POST /api/bind: record the fingerprint a session was established from.
///
/// Anyone able to bind could re-point a stolen token at their own device,
/// so the endpoint only exists when a shared secret is configured.
async fn handle_bind(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<BindBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Some(ref secret_hash) = state.bind_secret_hash else {
        let err = serde_json::json!({
            "error": "Binding over HTTP is disabled: set gateway.bind_secret"
        });
        return (StatusCode::FORBIDDEN, Json(err)).into_response();
    };

    let presented = headers
        .get(BIND_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(hash_token);
    match presented {
        Some(hash) if constant_time_eq(hash.as_bytes(), secret_hash.as_bytes()) => {}
        _ => {
            tracing::warn!("Bind: rejected request, invalid or missing X-Binding-Secret");
            let err = serde_json::json!({
                "error": "Unauthorized: invalid or missing X-Binding-Secret header"
            });
            return (StatusCode::UNAUTHORIZED, Json(err)).into_response();
        }
    }

    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => {
            let err = serde_json::json!({"error": format!("Invalid request: {e}")});
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    let outcome = state.binder.bind(&body.token_hash, &body.fingerprint).await;
    state.metrics.record_bind(outcome.label());

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"accepted": true})),
    )
        .into_response()
}

/// Request body for `/api/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    #[serde(default)]
    pub fingerprint: String,
}

/// POST /api/verify: classify the caller's session as valid or hijacked.
async fn handle_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Result<Json<VerifyBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_key = client_key(&headers, peer, state.trust_forwarded_headers);
    if !state.verify_limiter.check(&client_key) {
        tracing::warn!("/api/verify rate limit exceeded for key: {client_key}");
        let err = serde_json::json!({
            "error": "Too many verify requests. Please retry later.",
            "retry_after": RATE_LIMIT_WINDOW_SECS,
        });
        return (StatusCode::TOO_MANY_REQUESTS, Json(err)).into_response();
    }

    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => {
            let err = serde_json::json!({"error": format!("Invalid request: {e}")});
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    // Bindings are keyed by token hash; an absent token stays empty.
    let key = session_token(&headers, &state.auth_cookie)
        .map(hash_token)
        .unwrap_or_default();

    match state.verifier.verify(&key, &body.fingerprint).await {
        Ok(verification) => {
            state.metrics.record_verification(verification.label());
            (StatusCode::OK, Json(verification.to_record())).into_response()
        }
        Err(VerifyError::FingerprintMissing) => {
            state.metrics.record_verification("fingerprint_missing");
            let err = serde_json::json!({"error": VerifyError::FingerprintMissing.to_string()});
            (StatusCode::BAD_REQUEST, Json(err)).into_response()
        }
    }
}
