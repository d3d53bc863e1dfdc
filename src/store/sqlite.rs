//! SQLite-backed binding store.
//!
//! Table:
//! - `bindings`: token_hash, fingerprint, bound_at, expires_at
//!
//! Rusqlite is blocking, so every call hops onto the blocking pool and
//! takes the connection lock there.

use super::{SessionStore, StoreError};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Durable binding store over a single SQLite file.
pub struct SqliteStore {
    conn: Arc<Mutex<rusqlite::Connection>>,
    ttl: Option<Duration>,
}

impl SqliteStore {
    /// Open (or create) the binding database at the given path.
    pub fn open(db_path: &Path, ttl: Option<Duration>) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bindings (
                token_hash TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                bound_at INTEGER NOT NULL,
                expires_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_bindings_expires ON bindings(expires_at);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_owned();
        run_blocking(move || {
            let now = unix_now();
            let conn = conn.lock();
            let row = conn.query_row(
                "SELECT fingerprint FROM bindings
                 WHERE token_hash = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                rusqlite::params![key, now],
                |row| row.get::<_, String>(0),
            );

            match row {
                Ok(fingerprint) => Ok(Some(fingerprint)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_owned();
        let value = value.to_owned();
        let ttl_secs = self.ttl.map(|ttl| ttl.as_secs());
        run_blocking(move || {
            let now = unix_now();
            let expires_at = ttl_secs.map(|secs| now.saturating_add_unsigned(secs));
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO bindings (token_hash, fingerprint, bound_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(token_hash) DO UPDATE SET
                    fingerprint = excluded.fingerprint,
                    bound_at = excluded.bound_at,
                    expires_at = excluded.expires_at",
                rusqlite::params![key, value, now, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            let now = unix_now();
            let conn = conn.lock();
            let deleted = conn.execute(
                "DELETE FROM bindings WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                rusqlite::params![now],
            )?;
            Ok(deleted as u64)
        })
        .await
    }
}

/// Run a SQLite closure on the blocking pool, mapping both layers of
/// failure into [`StoreError`].
async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, rusqlite::Error> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StoreError::Backend(e.to_string())),
        Err(join) => Err(StoreError::Unavailable(format!(
            "sqlite worker failed: {join}"
        ))),
    }
}

/// Seconds since the Unix epoch, as stored in `bound_at` / `expires_at`.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
