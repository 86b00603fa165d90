//! Paginated views over a merged result list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::result::SourceResult;

/// Caller-supplied filter parameters (`source`, `image_type`, `min_views`, ...).
///
/// A `BTreeMap` keeps the keys sorted, so two equal filter sets always
/// serialize identically.
pub type FilterParams = BTreeMap<String, String>;

/// One page of an aggregated result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPage {
    /// Items on this page (never more than `per_page`)
    pub items: Vec<SourceResult>,

    /// Number of items across all pages
    pub total: usize,

    /// 1-based page number
    pub page: usize,

    /// Page size
    pub per_page: usize,

    /// `ceil(total / per_page)`
    pub total_pages: usize,

    /// Adapters that answered successfully, in dispatch order
    pub sources_used: Vec<String>,
}

impl AggregatedPage {
    /// An empty page for the given position
    pub fn empty(page: usize, per_page: usize) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: page.max(1),
            per_page: per_page.max(1),
            total_pages: 0,
            sources_used: Vec::new(),
        }
    }

    /// Whether a later page exists
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    /// Whether an earlier page exists
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Which cache tier answered a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Process-local volatile cache
    Memory,

    /// Durable store, within TTL
    Persistent,

    /// Durable store, past TTL (quota fallback)
    Stale,

    /// Last successful aggregation for the query (quota fallback)
    Snapshot,
}

/// Response handed to callers of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SourceResult>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub sources: Vec<String>,

    /// True when served from any cache tier
    pub cached: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_type: Option<CacheTier>,

    /// Advisory message for degraded or empty responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchResponse {
    /// Build a fresh (uncached) response from a page
    pub fn from_page(query: impl Into<String>, page: AggregatedPage) -> Self {
        Self {
            query: query.into(),
            has_next: page.has_next(),
            has_prev: page.has_prev(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages: page.total_pages,
            sources: page.sources_used,
            results: page.items,
            cached: false,
            cache_type: None,
            message: None,
        }
    }

    /// Mark the response as served from a cache tier
    pub fn with_cache(mut self, tier: CacheTier) -> Self {
        self.cached = true;
        self.cache_type = Some(tier);
        self
    }

    /// Attach an advisory message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
