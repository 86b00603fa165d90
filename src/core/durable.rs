//! SQLite-backed search cache that survives restarts.
//!
//! Two tables:
//! - `search_cache`: merged result lists per (query, filters), with expiry
//! - `search_snapshots`: last successful result list per query, no expiry
//!
//! Timestamps are stored as unix milliseconds. All access goes through
//! `spawn_blocking` so callers on the async runtime never block on I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cache_key::{cache_key, short};
use super::clock::{Clock, SystemClock};
use crate::domain::{FilterParams, SourceResult};

/// Default time-to-live (6 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Errors from the durable store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache connection lock poisoned")]
    LockPoisoned,

    #[error("Cache task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Entry counts for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurableStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub snapshots: usize,
}

/// Durable search cache
pub struct DurableCache {
    conn: Arc<Mutex<Connection>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl DurableCache {
    /// Open (or create) the cache database at `path`
    pub fn open(path: &Path, ttl: Duration) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn, ttl)
    }

    /// In-memory database (tests, throwaway runs)
    pub fn in_memory(ttl: Duration) -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?, ttl)
    }

    fn from_connection(conn: Connection, ttl: Duration) -> Result<Self, CacheError> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(365))
                .max(chrono::Duration::milliseconds(1)),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(DEFAULT_TTL)
    }

    /// Record key for a (query, filters) pair
    pub fn key_for(query: &str, filters: &FilterParams) -> String {
        cache_key("search", &json!({ "query": query, "filters": filters }))
    }

    /// Cached results within TTL
    pub async fn get_search(
        &self,
        query: &str,
        filters: &FilterParams,
    ) -> Result<Option<Vec<SourceResult>>, CacheError> {
        self.read_search(query, filters, false).await
    }

    /// Cached results even past TTL, as long as the row has not been reaped
    pub async fn get_search_stale(
        &self,
        query: &str,
        filters: &FilterParams,
    ) -> Result<Option<Vec<SourceResult>>, CacheError> {
        self.read_search(query, filters, true).await
    }

    async fn read_search(
        &self,
        query: &str,
        filters: &FilterParams,
        allow_expired: bool,
    ) -> Result<Option<Vec<SourceResult>>, CacheError> {
        let key = Self::key_for(query, filters);
        let now = self.clock.now().timestamp_millis();
        let min_expiry = if allow_expired { i64::MIN } else { now };

        let lookup_key = key.clone();
        let data: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT data FROM search_cache WHERE cache_key = ?1 AND expires_at > ?2",
                        params![lookup_key, min_expiry],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        let results = data.and_then(|data| decode_results(&key, &data));
        if results.is_some() {
            info!(query, stale = allow_expired, "Persistent cache hit");
        }
        Ok(results)
    }

    /// Upsert results for (query, filters); resets the expiry
    pub async fn set_search(
        &self,
        query: &str,
        filters: &FilterParams,
        data: &[SourceResult],
    ) -> Result<(), CacheError> {
        let key = Self::key_for(query, filters);
        let now = self.clock.now();
        let expires_at = (now + self.ttl).timestamp_millis();
        let updated_at = now.timestamp_millis();
        let filter_json = serde_json::to_string(filters)?;
        let data_json = serde_json::to_string(data)?;
        let query_owned = query.to_string();

        let record_key = key.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO search_cache (cache_key, query, filter_params, data, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(cache_key) DO UPDATE SET
                    query = excluded.query,
                    filter_params = excluded.filter_params,
                    data = excluded.data,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at",
                params![record_key, query_owned, filter_json, data_json, expires_at, updated_at],
            )?;
            Ok(())
        })
        .await?;

        info!(query, key = short(&key), count = data.len(), "Persistent cache stored");
        Ok(())
    }

    /// Replace the last-good snapshot for a query
    pub async fn set_snapshot(&self, query: &str, data: &[SourceResult]) -> Result<(), CacheError> {
        let data_json = serde_json::to_string(data)?;
        let updated_at = self.clock.now().timestamp_millis();
        let query_owned = query.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO search_snapshots (query, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(query) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                params![query_owned, data_json, updated_at],
            )?;
            Ok(())
        })
        .await?;

        debug!(query, count = data.len(), "Snapshot stored");
        Ok(())
    }

    /// Last-good snapshot for a query
    pub async fn get_snapshot(&self, query: &str) -> Result<Option<Vec<SourceResult>>, CacheError> {
        let query_owned = query.to_string();
        let data: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT data FROM search_snapshots WHERE query = ?1",
                        params![query_owned],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        Ok(data.and_then(|data| decode_results(query, &data)))
    }

    /// Delete expired search entries; returns how many were removed
    pub async fn cleanup_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now().timestamp_millis();
        let deleted = self
            .with_conn(move |conn| {
                Ok(conn.execute("DELETE FROM search_cache WHERE expires_at <= ?1", params![now])?)
            })
            .await?;

        if deleted > 0 {
            info!(deleted, "Cleaned up expired persistent cache entries");
        }
        Ok(deleted)
    }

    /// Entry counts
    pub async fn stats(&self) -> Result<DurableStats, CacheError> {
        let now = self.clock.now().timestamp_millis();
        self.with_conn(move |conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM search_cache", [], |row| row.get(0))?;
            let valid: i64 = conn.query_row(
                "SELECT COUNT(*) FROM search_cache WHERE expires_at > ?1",
                params![now],
                |row| row.get(0),
            )?;
            let snapshots: i64 =
                conn.query_row("SELECT COUNT(*) FROM search_snapshots", [], |row| row.get(0))?;

            Ok(DurableStats {
                total_entries: total as usize,
                valid_entries: valid as usize,
                expired_entries: (total - valid) as usize,
                snapshots: snapshots as usize,
            })
        })
        .await
    }

    /// Remove every search entry and snapshot; returns how many rows were deleted
    pub async fn clear(&self) -> Result<usize, CacheError> {
        self.with_conn(|conn| {
            let entries = conn.execute("DELETE FROM search_cache", [])?;
            let snapshots = conn.execute("DELETE FROM search_snapshots", [])?;
            Ok(entries + snapshots)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| CacheError::LockPoisoned)?;
            f(&guard)
        })
        .await?
    }
}

fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS search_cache (
            cache_key TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            filter_params TEXT NOT NULL,
            data TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_search_cache_expires
            ON search_cache(expires_at);

        CREATE TABLE IF NOT EXISTS search_snapshots (
            query TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Unreadable rows are misses, never errors
fn decode_results(label: &str, data: &str) -> Option<Vec<SourceResult>> {
    match serde_json::from_str(data) {
        Ok(results) => Some(results),
        Err(e) => {
            warn!(label, error = %e, "Ignoring unreadable persistent cache row");
            None
        }
    }
}
