//! ccscout - tiered caching and quota-aware fan-out for content discovery
//!
//! Searches many independent, rate-limited providers for openly licensed
//! videos and images, merges their answers into one ranked, deduplicated,
//! license-filtered list, and spends as little provider quota as possible.
//!
//! # Architecture
//!
//! A search passes through two cache tiers before reaching any provider:
//! - Durable (SQLite) cache, consulted for first pages only
//! - Volatile (in-memory) cache with TTL and ETag revalidation
//! - Concurrent fan-out to source adapters, each under its own timeout
//!
//! When providers run out of quota, stale and last-good results are served
//! instead of an error.
//!
//! # Modules
//!
//! - `adapters`: Provider integrations (YouTube, Pexels, Pixabay, Unsplash)
//! - `core`: Caches, batching, fan-out, license classification
//! - `domain`: Data structures (SourceResult, AggregatedPage, SearchResponse)
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Search all configured sources
//! ccscout search "ocean waves" --per-page 10
//!
//! # Only vector images from Pixabay
//! ccscout search cats --source pixabay -f image_type=vector
//!
//! # Inspect and clear the caches
//! ccscout cache stats
//! ccscout cache clear
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{Conditional, FetchContext, SourceAdapter, SourceError};
pub use core::{Discovery, SearchRequest};
pub use domain::{AggregatedPage, CacheTier, ContentKind, SearchResponse, SourceResult};
