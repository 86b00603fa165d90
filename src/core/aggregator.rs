//! Concurrent fan-out over source adapters.
//!
//! Every adapter runs at once under its own timeout. Failures and timeouts
//! are isolated: the adapter contributes nothing and the rest carry on.
//! Surviving results are license-filtered, deduplicated (first occurrence in
//! dispatch order wins), ranked and paginated.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::license::LicenseClassifier;
use crate::adapters::{FetchContext, SourceAdapter};
use crate::domain::{AggregatedPage, SourceResult};

/// Default per-adapter timeout
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(15);

/// What happened to one adapter during a fan-out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Ok { count: usize },
    Failed { reason: String },
    QuotaExceeded,
    TimedOut,
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Merged, filtered and ranked results of one fan-out
#[derive(Debug, Clone, Default)]
pub struct Merged {
    pub items: Vec<SourceResult>,

    /// Adapters that answered, in dispatch order
    pub sources_used: Vec<String>,

    /// Per-adapter outcome, in dispatch order
    pub outcomes: Vec<(String, SourceOutcome)>,
}

impl Merged {
    /// At least one adapter ran out of quota
    pub fn quota_exceeded(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| *outcome == SourceOutcome::QuotaExceeded)
    }

    /// Adapters were dispatched and none answered
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.sources_used.is_empty()
    }
}

/// Dispatches a query to many adapters and merges what comes back
pub struct SourceFanoutAggregator {
    classifier: Arc<LicenseClassifier>,
    timeout: Duration,
}

impl SourceFanoutAggregator {
    pub fn new(classifier: Arc<LicenseClassifier>) -> Self {
        Self {
            classifier,
            timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    /// Override the per-adapter timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn classifier(&self) -> &LicenseClassifier {
        &self.classifier
    }

    /// Run every adapter concurrently and merge the survivors
    #[instrument(skip(self, adapters, ctx), fields(adapters = adapters.len()))]
    pub async fn collect(
        &self,
        query: &str,
        adapters: &[Arc<dyn SourceAdapter>],
        per_source_limit: usize,
        ctx: &FetchContext,
    ) -> Merged {
        let timeout = self.timeout;
        let calls = adapters.iter().map(|adapter| async move {
            let name = adapter.name().to_string();
            let result =
                tokio::time::timeout(timeout, adapter.fetch(query, per_source_limit, ctx)).await;
            (name, result)
        });

        let mut merged = Merged::default();
        let mut raw = Vec::new();

        for (name, result) in join_all(calls).await {
            let outcome = match result {
                Ok(Ok(mut items)) => {
                    items.truncate(per_source_limit);
                    let count = items.len();
                    raw.extend(items);
                    merged.sources_used.push(name.clone());
                    SourceOutcome::Ok { count }
                }
                Ok(Err(e)) if e.is_quota_exceeded() => {
                    warn!(source = %name, "Source quota exceeded");
                    SourceOutcome::QuotaExceeded
                }
                Ok(Err(e)) => {
                    warn!(source = %name, error = %e, "Source failed");
                    SourceOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
                Err(_) => {
                    warn!(source = %name, timeout_ms = timeout.as_millis() as u64, "Source timed out");
                    SourceOutcome::TimedOut
                }
            };
            merged.outcomes.push((name, outcome));
        }

        let fetched = raw.len();
        let mut items = dedupe(self.classifier.filter(raw));
        rank(&mut items);

        info!(
            fetched,
            kept = items.len(),
            sources = merged.sources_used.len(),
            "Fan-out complete"
        );
        merged.items = items;
        merged
    }

    /// Fan out, merge and return one page
    pub async fn aggregate(
        &self,
        query: &str,
        adapters: &[Arc<dyn SourceAdapter>],
        per_source_limit: usize,
        ctx: &FetchContext,
        page: usize,
        per_page: usize,
    ) -> AggregatedPage {
        let merged = self.collect(query, adapters, per_source_limit, ctx).await;
        paginate(merged.items, merged.sources_used, page, per_page)
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Drop any item whose URL or title was already seen; first occurrence wins
pub fn dedupe(items: Vec<SourceResult>) -> Vec<SourceResult> {
    let mut seen_urls = HashSet::new();
    let mut seen_titles = HashSet::new();

    items
        .into_iter()
        .filter(|item| {
            let url = normalize_url(&item.url);
            let title = normalize_title(&item.title);

            if (!url.is_empty() && seen_urls.contains(&url))
                || (!title.is_empty() && seen_titles.contains(&title))
            {
                return false;
            }
            if !url.is_empty() {
                seen_urls.insert(url);
            }
            if !title.is_empty() {
                seen_titles.insert(title);
            }
            true
        })
        .collect()
}

/// Stable sort: results with a description and a thumbnail first
pub fn rank(items: &mut [SourceResult]) {
    items.sort_by_key(|item| !item.is_rich());
}

/// Slice one page out of a merged list
pub fn paginate(
    items: Vec<SourceResult>,
    sources_used: Vec<String>,
    page: usize,
    per_page: usize,
) -> AggregatedPage {
    let page = page.max(1);
    let per_page = per_page.max(1);
    let total = items.len();
    let offset = (page - 1).saturating_mul(per_page);

    AggregatedPage {
        items: items.into_iter().skip(offset).take(per_page).collect(),
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
        sources_used,
    }
}
