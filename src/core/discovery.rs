//! Tiered search entry point.
//!
//! Lookup order for a request:
//! 1. Durable cache (first page only; a hit warms the volatile tier)
//! 2. Volatile cache, keyed by query, filters and per-source limit
//! 3. Fan-out to the adapters; non-empty results are written to both tiers
//!
//! When the fan-out comes back empty because a provider ran out of quota,
//! the response falls back to a stale durable entry, then to the last-good
//! snapshot for the query, then to an empty page with an advisory message.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::aggregator::{paginate, Merged, SourceFanoutAggregator};
use super::cache_key::{cache_key, short};
use super::durable::{CacheError, DurableCache, DurableStats};
use super::quota::QuotaToken;
use super::volatile::VolatileCache;
use crate::adapters::{FetchContext, SourceAdapter};
use crate::domain::{AggregatedPage, CacheTier, FilterParams, SearchResponse, SourceResult};

/// Default number of results requested from each adapter
pub const DEFAULT_PER_SOURCE_LIMIT: usize = 30;

/// Default page size
pub const DEFAULT_PER_PAGE: usize = 30;

/// Filter naming a single source to query
pub const SOURCE_FILTER: &str = "source";

const MSG_NO_RESULTS: &str = "No results found";
const MSG_ALL_FAILED: &str = "All sources are currently unavailable. Please try again later.";
const MSG_QUOTA_STALE: &str = "Provider quota exceeded; showing previously cached results.";
const MSG_QUOTA_DEGRADED: &str =
    "Search is temporarily degraded because provider quota is exhausted. Please try again later.";

/// A search as requested by a caller
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub filters: FilterParams,
    pub page: usize,
    pub per_page: usize,
    /// Bypass cache reads (results are still written back)
    pub skip_cache: bool,
    /// Raw caller identity; only its quota token leaves the process
    pub user: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: FilterParams::new(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            skip_cache: false,
            user: None,
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }
}

/// Cache statistics across both tiers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_ttl_seconds: u64,

    /// `None` when no durable tier is configured or it could not be read
    pub persistent: Option<DurableStats>,
    pub persistent_ttl_seconds: Option<u64>,
}

/// Entries removed per tier by `clear_caches` or `sweep`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub memory: usize,
    pub persistent: usize,
}

/// Merged list as stored in the volatile tier
#[derive(Debug, Serialize, Deserialize)]
struct CachedAggregate {
    items: Vec<SourceResult>,
    sources: Vec<String>,
}

/// Tiered search over a set of adapters
pub struct Discovery {
    volatile: Arc<VolatileCache>,
    durable: Option<Arc<DurableCache>>,
    aggregator: SourceFanoutAggregator,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    per_source_limit: usize,
}

impl Discovery {
    pub fn new(volatile: Arc<VolatileCache>, aggregator: SourceFanoutAggregator) -> Self {
        Self {
            volatile,
            durable: None,
            aggregator,
            adapters: Vec::new(),
            per_source_limit: DEFAULT_PER_SOURCE_LIMIT,
        }
    }

    /// Attach the durable tier
    pub fn with_durable(mut self, durable: Arc<DurableCache>) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Register an adapter; dispatch order is registration order
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_per_source_limit(mut self, limit: usize) -> Self {
        self.per_source_limit = limit.max(1);
        self
    }

    /// Names of the registered adapters, in dispatch order
    pub fn source_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    fn memory_key(&self, query: &str, filters: &FilterParams) -> String {
        cache_key(
            "aggregate",
            &json!({ "query": query, "filters": filters, "limit": self.per_source_limit }),
        )
    }

    /// Adapters selected by the `source` filter (`all` or absent selects every adapter)
    fn select_adapters(&self, ctx: &FetchContext) -> Vec<Arc<dyn SourceAdapter>> {
        match ctx.filter(SOURCE_FILTER).map(str::to_lowercase) {
            Some(wanted) if wanted != "all" => self
                .adapters
                .iter()
                .filter(|a| a.name().to_lowercase().starts_with(&wanted))
                .cloned()
                .collect(),
            _ => self.adapters.clone(),
        }
    }

    /// Run a search through the cache tiers and, on a miss, the adapters
    #[instrument(skip(self, request), fields(query = %request.query, page = request.page))]
    pub async fn search(&self, request: &SearchRequest) -> SearchResponse {
        let query = request.query.trim();
        let page = request.page.max(1);
        let per_page = request.per_page.max(1);

        if query.is_empty() {
            return SearchResponse::from_page(query, AggregatedPage::empty(page, per_page))
                .with_message("Query must not be empty");
        }

        let memory_key = self.memory_key(query, &request.filters);

        if !request.skip_cache {
            if page == 1 {
                if let Some(items) = self.durable_lookup(query, &request.filters, false).await {
                    let sources = sources_of(&items);
                    self.volatile.set_json(
                        &memory_key,
                        &CachedAggregate {
                            items: items.clone(),
                            sources: sources.clone(),
                        },
                        None,
                    );
                    return respond(query, items, sources, page, per_page)
                        .with_cache(CacheTier::Persistent);
                }
            }

            if let Some(cached) = self.volatile.get_json::<CachedAggregate>(&memory_key) {
                debug!(key = short(&memory_key), "Serving search from memory cache");
                return respond(query, cached.items, cached.sources, page, per_page)
                    .with_cache(CacheTier::Memory);
            }
        }

        let mut ctx = FetchContext::new(request.filters.clone());
        if let Some(user) = &request.user {
            ctx = ctx.with_quota_user(QuotaToken::new(user.as_str()));
        }

        let adapters = self.select_adapters(&ctx);
        if adapters.is_empty() {
            let wanted = ctx.filter(SOURCE_FILTER).unwrap_or_default();
            return SearchResponse::from_page(query, AggregatedPage::empty(page, per_page))
                .with_message(format!("Unknown source: {}", wanted));
        }

        let merged = self
            .aggregator
            .collect(query, &adapters, self.per_source_limit, &ctx)
            .await;

        if !merged.items.is_empty() {
            self.store(query, &request.filters, &memory_key, &merged).await;
            return respond(query, merged.items, merged.sources_used, page, per_page);
        }

        if merged.quota_exceeded() {
            return self.quota_fallback(query, &request.filters, page, per_page).await;
        }

        let message = if merged.all_failed() {
            MSG_ALL_FAILED
        } else {
            MSG_NO_RESULTS
        };
        respond(query, Vec::new(), merged.sources_used, page, per_page).with_message(message)
    }

    async fn store(&self, query: &str, filters: &FilterParams, memory_key: &str, merged: &Merged) {
        self.volatile.set_json(
            memory_key,
            &CachedAggregate {
                items: merged.items.clone(),
                sources: merged.sources_used.clone(),
            },
            None,
        );

        let Some(durable) = &self.durable else {
            return;
        };
        if let Err(e) = durable.set_search(query, filters, &merged.items).await {
            warn!(error = %e, "Failed to write persistent cache");
        }
        if let Err(e) = durable.set_snapshot(query, &merged.items).await {
            warn!(error = %e, "Failed to write snapshot");
        }
    }

    async fn quota_fallback(
        &self,
        query: &str,
        filters: &FilterParams,
        page: usize,
        per_page: usize,
    ) -> SearchResponse {
        if let Some(items) = self.durable_lookup(query, filters, true).await {
            info!(query, "Quota exceeded; serving stale persistent cache");
            let sources = sources_of(&items);
            return respond(query, items, sources, page, per_page)
                .with_cache(CacheTier::Stale)
                .with_message(MSG_QUOTA_STALE);
        }

        if let Some(durable) = &self.durable {
            match durable.get_snapshot(query).await {
                Ok(Some(items)) if !items.is_empty() => {
                    info!(query, "Quota exceeded; serving last-good snapshot");
                    let sources = sources_of(&items);
                    return respond(query, items, sources, page, per_page)
                        .with_cache(CacheTier::Snapshot)
                        .with_message(MSG_QUOTA_STALE);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Snapshot lookup failed"),
            }
        }

        warn!(query, "Quota exceeded and nothing cached; degraded response");
        SearchResponse::from_page(query, AggregatedPage::empty(page, per_page))
            .with_message(MSG_QUOTA_DEGRADED)
    }

    /// Durable lookup with errors logged and treated as misses
    async fn durable_lookup(
        &self,
        query: &str,
        filters: &FilterParams,
        allow_stale: bool,
    ) -> Option<Vec<SourceResult>> {
        let durable = self.durable.as_ref()?;
        let result = if allow_stale {
            durable.get_search_stale(query, filters).await
        } else {
            durable.get_search(query, filters).await
        };

        match result {
            Ok(Some(items)) if !items.is_empty() => Some(items),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Persistent cache lookup failed");
                None
            }
        }
    }

    /// Entry counts and TTLs for both tiers
    pub async fn stats(&self) -> CacheStats {
        let (persistent, persistent_ttl_seconds) = match &self.durable {
            Some(durable) => {
                let stats = match durable.stats().await {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        warn!(error = %e, "Persistent cache stats unavailable");
                        None
                    }
                };
                (stats, Some(durable.ttl().as_secs()))
            }
            None => (None, None),
        };

        CacheStats {
            memory_entries: self.volatile.len(),
            memory_ttl_seconds: self.volatile.ttl().as_secs(),
            persistent,
            persistent_ttl_seconds,
        }
    }

    /// Empty both tiers; safe to repeat
    pub async fn clear_caches(&self) -> Result<ClearReport, CacheError> {
        let memory = self.volatile.clear();
        let persistent = match &self.durable {
            Some(durable) => durable.clear().await?,
            None => 0,
        };

        info!(memory, persistent, "Caches cleared");
        Ok(ClearReport { memory, persistent })
    }

    /// Remove expired entries from both tiers
    pub async fn sweep(&self) -> Result<ClearReport, CacheError> {
        let memory = self.volatile.clear_expired();
        let persistent = match &self.durable {
            Some(durable) => durable.cleanup_expired().await?,
            None => 0,
        };
        Ok(ClearReport { memory, persistent })
    }
}

fn respond(
    query: &str,
    items: Vec<SourceResult>,
    sources: Vec<String>,
    page: usize,
    per_page: usize,
) -> SearchResponse {
    SearchResponse::from_page(query, paginate(items, sources, page, per_page))
}

/// Distinct source names in first-seen order
fn sources_of(items: &[SourceResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for item in items {
        if !sources.contains(&item.source_name) {
            sources.push(item.source_name.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SourceError;
    use crate::core::license::{LicenseClassifier, LicenseTable};
    use crate::domain::ContentKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        name: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceAdapter for Counting {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(
            &self,
            query: &str,
            _limit: usize,
            _ctx: &FetchContext,
        ) -> Result<Vec<SourceResult>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![SourceResult::new(
                self.name,
                1,
                format!("{} result", query),
                format!("https://{}.example/1", self.name),
                "CC BY 4.0",
                ContentKind::Image,
            )])
        }
    }

    fn discovery(adapter: Arc<Counting>) -> Discovery {
        let classifier = Arc::new(LicenseClassifier::new(LicenseTable::default()));
        Discovery::new(
            Arc::new(VolatileCache::new(Duration::from_secs(60))),
            SourceFanoutAggregator::new(classifier),
        )
        .with_adapter(adapter)
    }

    #[tokio::test]
    async fn test_second_search_hits_memory() {
        let adapter = Arc::new(Counting {
            name: "pexels",
            calls: AtomicUsize::new(0),
        });
        let discovery = discovery(adapter.clone());
        let request = SearchRequest::new("ocean");

        let first = discovery.search(&request).await;
        let second = discovery.search(&request).await;

        assert!(!first.cached);
        assert_eq!(second.cache_type, Some(CacheTier::Memory));
        assert_eq!(second.results, first.results);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);

        discovery.search(&request.clone().skip_cache()).await;
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blank_query_and_unknown_source() {
        let adapter = Arc::new(Counting {
            name: "pexels",
            calls: AtomicUsize::new(0),
        });
        let discovery = discovery(adapter.clone());

        let blank = discovery.search(&SearchRequest::new("   ")).await;
        assert!(blank.results.is_empty());
        assert!(blank.message.is_some());

        let unknown = discovery
            .search(&SearchRequest::new("ocean").with_filter("source", "flickr"))
            .await;
        assert_eq!(unknown.message.as_deref(), Some("Unknown source: flickr"));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sources_of_keeps_first_seen_order() {
        let make = |source: &str, id: u32| {
            SourceResult::new(source, id, "t", "u", "CC0", ContentKind::Image)
        };
        let items = vec![make("B", 1), make("A", 2), make("B", 3)];
        assert_eq!(sources_of(&items), vec!["B".to_string(), "A".to_string()]);
    }
}
