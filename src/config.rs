//! TOML configuration for the binding store, gateway and client SDK.
//!
//! Lookup order: `--config <path>`, then `$HIJACKGUARD_CONFIG`, then
//! `~/.hijackguard/config.toml`. A missing file is not an error; every
//! field has a default.

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "HIJACKGUARD_CONFIG";

/// Directory under the user's home holding config and the default database.
const CONFIG_DIR_NAME: &str = ".hijackguard";

/// Base URL of the hosted session-hijacking API.
pub const DEFAULT_CLIENT_BASE_URL: &str = "https://session-hijacking.vercel.app";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
    pub client: ClientConfig,
}

/// Which backend persists bindings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database file. Defaults to `~/.hijackguard/bindings.db`.
    pub sqlite_path: Option<PathBuf>,
    pub redis_url: String,
    /// Prefix for Redis keys.
    pub key_prefix: String,
    /// Expire bindings this many seconds after they are written. Unset keeps
    /// them until the backend evicts them.
    pub binding_ttl_secs: Option<u64>,
    /// Deadline for a single store round-trip, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: None,
            redis_url: "redis://127.0.0.1:6379/".into(),
            key_prefix: "hijackguard:fp:".into(),
            binding_ttl_secs: None,
            timeout_ms: 2_000,
        }
    }
}

impl StoreConfig {
    pub fn binding_ttl(&self) -> Option<Duration> {
        self.binding_ttl_secs.map(Duration::from_secs)
    }

    /// Configured SQLite path, or the default under the config directory.
    pub fn resolved_sqlite_path(&self) -> Result<PathBuf> {
        match self.sqlite_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("bindings.db")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Allow binding a non-loopback address.
    pub allow_public_bind: bool,
    /// Cookie carrying the session token when no bearer header is sent.
    pub auth_cookie: String,
    /// Shared secret required in `X-Binding-Secret` on `POST /api/bind`.
    /// Unset disables the endpoint.
    pub bind_secret: Option<String>,
    /// Verify requests allowed per client per minute (0 = unlimited).
    pub verify_per_minute: u32,
    /// Identify clients by `X-Forwarded-For` / `X-Real-IP` instead of the
    /// TCP peer. Only enable behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            allow_public_bind: false,
            auth_cookie: "auth_token".into(),
            bind_secret: None,
            verify_per_minute: 120,
            trust_forwarded_headers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CLIENT_BASE_URL.into(),
        }
    }
}

impl Config {
    /// Load the config from an explicit path, the environment, or the
    /// default location, in that order.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => match std::env::var_os(CONFIG_ENV_VAR) {
                Some(path) => Some(PathBuf::from(path)),
                None => config_dir().ok().map(|dir| dir.join("config.toml")),
            },
        };

        match path {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) if explicit.is_some() => {
                anyhow::bail!("Config file not found: {}", path.display())
            }
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// JSON schema of the config file, pretty-printed.
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

/// `~/.hijackguard`
fn config_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}
