//! Batched, conditionally revalidated detail fetches.
//!
//! Provider detail endpoints accept a bounded number of ids per call. The
//! coordinator splits the id list into chunks, serves each chunk from the
//! volatile cache when it can, and otherwise issues a conditional request
//! carrying the chunk's last ETag. A 304 reuses the cached chunk.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cache_key::{cache_key, short};
use super::volatile::VolatileCache;
use crate::adapters::{Conditional, SourceError};

/// Provider-imposed ceiling on ids per detail call
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// An item returned by a detail endpoint, identified by the id it was
/// requested with
pub trait BatchItem {
    fn batch_id(&self) -> &str;
}

impl BatchItem for String {
    fn batch_id(&self) -> &str {
        self
    }
}

/// Put `items` into the order of `ids`; items with unknown ids go last.
///
/// Chunk cache keys ignore id order, so a cached chunk may come back in the
/// order of whichever request stored it.
fn order_by_ids<T: BatchItem>(items: &mut [T], ids: &[String]) {
    let position: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    items.sort_by_key(|item| position.get(item.batch_id()).copied().unwrap_or(usize::MAX));
}

/// How a cached-or-fetched value was obtained
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// Valid cache entry; no request made
    Hit(T),
    /// Fresh body from the provider
    Fresh(T),
    /// Provider answered 304; cached body reused
    NotModified(T),
}

impl<T> Fetched<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Hit(v) | Self::Fresh(v) | Self::NotModified(v) => v,
        }
    }

    /// Whether a request went out
    pub fn was_requested(&self) -> bool {
        !matches!(self, Self::Hit(_))
    }
}

/// A chunk that failed; chunks before it were kept
#[derive(Debug, Clone, Error)]
#[error("detail batch {batch_index} of {batch_count} failed")]
pub struct BatchFailure {
    /// Zero-based index of the failed chunk
    pub batch_index: usize,
    pub batch_count: usize,
    #[source]
    pub error: SourceError,
}

/// Outcome of a batched detail fetch
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Items from every successful chunk, in id order
    pub items: Vec<T>,
    /// Chunks that required a provider request
    pub requests: usize,
    pub failure: Option<BatchFailure>,
}

impl<T> BatchOutcome<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            requests: 0,
            failure: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Fail if any chunk failed, discarding partial items
    pub fn into_result(self) -> Result<Vec<T>, BatchFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.items),
        }
    }
}

/// Splits detail lookups into provider-sized, cached chunks
pub struct BatchCoordinator {
    cache: Arc<VolatileCache>,
    max_batch_size: usize,
}

impl BatchCoordinator {
    pub fn new(cache: Arc<VolatileCache>) -> Self {
        Self::with_batch_size(cache, DEFAULT_MAX_BATCH_SIZE)
    }

    pub fn with_batch_size(cache: Arc<VolatileCache>, max_batch_size: usize) -> Self {
        Self {
            cache,
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Serve `key` from cache or fetch it conditionally.
    ///
    /// `fetch` receives the stored ETag, if any. A 304 reuses the cached body
    /// without extending its lifetime; if that body has meanwhile been swept,
    /// the request is repeated without an ETag.
    pub async fn fetch_cached<T, F, Fut>(
        &self,
        key: &str,
        mut fetch: F,
    ) -> Result<Fetched<T>, SourceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Conditional<T>, SourceError>>,
    {
        if let Some(hit) = self.cache.get_json::<T>(key) {
            return Ok(Fetched::Hit(hit));
        }

        let etag = self.cache.etag_for(key);
        let conditional = etag.is_some();

        match fetch(etag).await? {
            Conditional::Modified { body, etag } => {
                self.cache.set_json(key, &body, etag);
                Ok(Fetched::Fresh(body))
            }
            Conditional::NotModified => {
                let cached = self
                    .cache
                    .peek(key)
                    .and_then(|entry| serde_json::from_value::<T>(entry.payload).ok());
                match cached {
                    Some(body) => {
                        debug!(key = short(key), "Reusing cached body after 304");
                        Ok(Fetched::NotModified(body))
                    }
                    None => {
                        warn!(
                            key = short(key),
                            conditional, "304 without a cached body; refetching"
                        );
                        match fetch(None).await? {
                            Conditional::Modified { body, etag } => {
                                self.cache.set_json(key, &body, etag);
                                Ok(Fetched::Fresh(body))
                            }
                            Conditional::NotModified => Err(SourceError::Malformed {
                                provider: "batch".to_string(),
                                message: "304 returned for an unconditional request".to_string(),
                            }),
                        }
                    }
                }
            }
        }
    }

    /// Fetch details for `ids` in chunks of at most `max_batch_size`.
    ///
    /// Chunks run sequentially and results keep id order. A failing chunk
    /// stops the run; items from earlier chunks are returned alongside the
    /// failure. The combined result is cached only when every chunk succeeds.
    pub async fn fetch_details<T, F, Fut>(
        &self,
        operation: &str,
        ids: &[String],
        mut fetch_batch: F,
    ) -> BatchOutcome<T>
    where
        T: BatchItem + Serialize + DeserializeOwned,
        F: FnMut(Vec<String>, Option<String>) -> Fut,
        Fut: Future<Output = Result<Conditional<Vec<T>>, SourceError>>,
    {
        if ids.is_empty() {
            return BatchOutcome::empty();
        }

        let overall_key = cache_key(operation, &json!({ "ids": ids.join(",") }));
        if let Some(items) = self.cache.get_json::<Vec<T>>(&overall_key) {
            debug!(operation, ids = ids.len(), "Detail lookup served from cache");
            return BatchOutcome {
                items,
                requests: 0,
                failure: None,
            };
        }

        let batch_count = ids.len().div_ceil(self.max_batch_size);
        let batch_operation = format!("{}_batch", operation);
        let mut outcome = BatchOutcome::empty();

        for (batch_index, chunk) in ids.chunks(self.max_batch_size).enumerate() {
            let mut sorted = chunk.to_vec();
            sorted.sort();
            let key = cache_key(&batch_operation, &json!({ "ids": sorted.join(",") }));

            let result = self
                .fetch_cached(&key, |etag| fetch_batch(chunk.to_vec(), etag))
                .await;

            match result {
                Ok(fetched) => {
                    if fetched.was_requested() {
                        outcome.requests += 1;
                    }
                    let mut items = fetched.into_inner();
                    order_by_ids(&mut items, chunk);
                    outcome.items.extend(items);
                }
                Err(error) => {
                    warn!(
                        operation,
                        batch = batch_index + 1,
                        of = batch_count,
                        error = %error,
                        "Detail batch failed"
                    );
                    outcome.failure = Some(BatchFailure {
                        batch_index,
                        batch_count,
                        error,
                    });
                    return outcome;
                }
            }
        }

        self.cache.set_json(&overall_key, &outcome.items, None);
        info!(
            operation,
            ids = ids.len(),
            batches = batch_count,
            requests = outcome.requests,
            "Detail lookup complete"
        );
        outcome
    }
}
