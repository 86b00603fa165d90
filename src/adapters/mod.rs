//! Adapter interfaces for content providers.
//!
//! Each adapter queries one external catalog and maps its response into
//! `SourceResult`s. Adapters never panic on provider errors; every failure
//! comes back as a `SourceError` so the fan-out can carry on with the others.

pub mod http;
pub mod pexels;
pub mod pixabay;
pub mod unsplash;
pub mod youtube;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::quota::QuotaToken;
use crate::domain::{FilterParams, SourceResult};

pub use pexels::PexelsAdapter;
pub use pixabay::PixabayAdapter;
pub use unsplash::UnsplashAdapter;
pub use youtube::YouTubeAdapter;

/// Errors a provider call can produce
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("{provider}: quota exceeded")]
    QuotaExceeded { provider: String },

    #[error("{provider}: HTTP {status}")]
    Http { provider: String, status: u16 },

    #[error("{provider}: network error: {message}")]
    Network { provider: String, message: String },

    #[error("{provider}: malformed response: {message}")]
    Malformed { provider: String, message: String },

    #[error("{provider}: timed out after {elapsed:?}")]
    Timeout { provider: String, elapsed: Duration },

    #[error("{provider}: not configured ({message})")]
    NotConfigured { provider: String, message: String },
}

impl SourceError {
    /// Provider quota (or rate limit) exhausted
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::QuotaExceeded { provider }
            | Self::Http { provider, .. }
            | Self::Network { provider, .. }
            | Self::Malformed { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::NotConfigured { provider, .. } => provider,
        }
    }
}

/// Result of a conditional (ETag) request
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T> {
    /// Fresh body, with the ETag the provider attached (if any)
    Modified { body: T, etag: Option<String> },
    /// 304: the cached body is still current
    NotModified,
}

/// Per-request context handed to every adapter
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    /// Caller-supplied filters (`image_type`, `min_views`, ...)
    pub filters: FilterParams,
    /// Anonymized caller identity for per-user quota accounting
    pub quota_user: Option<QuotaToken>,
}

impl FetchContext {
    pub fn new(filters: FilterParams) -> Self {
        Self {
            filters,
            quota_user: None,
        }
    }

    pub fn with_quota_user(mut self, token: QuotaToken) -> Self {
        self.quota_user = Some(token);
        self
    }

    /// A filter value, ignoring empty strings
    pub fn filter(&self, name: &str) -> Option<&str> {
        self.filters
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// A content provider
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source name as shown to users (e.g. "YouTube (CC)")
    fn name(&self) -> &str;

    /// Fetch up to `limit` results for `query`
    async fn fetch(
        &self,
        query: &str,
        limit: usize,
        ctx: &FetchContext,
    ) -> Result<Vec<SourceResult>, SourceError>;
}
