//! Process-local, time-bounded response cache.
//!
//! Entries hold a JSON payload and, when the provider sent one, its ETag.
//! An expired entry is a miss for `get`. Expired entries without an ETag are
//! evicted on that `get`; entries with an ETag stay available to `etag_for`
//! and `peek` (for conditional revalidation) until `clear_expired` sweeps
//! them. Losing the whole cache only costs refetches.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::cache_key::short;
use super::clock::{Clock, SystemClock};

/// Default time-to-live (30 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// A cached payload with its validity window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub etag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Valid iff `now < expires_at`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// In-memory TTL cache shared across tasks
pub struct VolatileCache {
    entries: DashMap<String, CacheEntry>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl Default for VolatileCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl VolatileCache {
    /// Create a cache using wall-clock time
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit time source
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        // A zero TTL would break `expires_at > created_at`
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365))
            .max(chrono::Duration::milliseconds(1));

        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(DEFAULT_TTL)
    }

    /// Get a valid entry; an expired one is reported as absent
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();

        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => {
                debug!(key = short(key), "Memory cache hit");
                return Some(entry.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            // Re-check under the shard lock: a concurrent `set` may have refreshed it
            self.entries
                .remove_if(key, |_, entry| !entry.is_valid_at(now) && entry.etag.is_none());
            debug!(key = short(key), "Memory cache entry expired");
        }

        None
    }

    /// Get an entry regardless of validity, without evicting it
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Upsert a payload; resets the entry's validity window
    pub fn set(&self, key: &str, payload: Value, etag: Option<String>) {
        let created_at = self.clock.now();
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            etag,
            created_at,
            expires_at: created_at + self.ttl,
        };
        self.entries.insert(key.to_string(), entry);
        debug!(key = short(key), "Memory cache stored");
    }

    /// Stored ETag for a key, without a validity check
    pub fn etag_for(&self, key: &str) -> Option<String> {
        self.entries.get(key).and_then(|entry| entry.etag.clone())
    }

    /// Decode a valid entry; an undecodable payload counts as a miss
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.get(key)?;
        match serde_json::from_value(entry.payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = short(key), error = %e, "Discarding unreadable memory cache entry");
                self.entries.remove(key);
                None
            }
        }
    }

    /// Serialize and store a value
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T, etag: Option<String>) {
        match serde_json::to_value(value) {
            Ok(payload) => self.set(key, payload, etag),
            Err(e) => warn!(key = short(key), error = %e, "Skipping memory cache write"),
        }
    }

    /// Remove every expired entry; returns how many were removed
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.is_valid_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            info!(removed, "Cleared expired memory cache entries");
        }
        removed
    }

    /// Drop everything; returns how many entries were held
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of entries currently held (valid or not)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
