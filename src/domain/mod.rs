//! Domain types shared by adapters, caches and the aggregator.
//!
//! - SourceResult: the one shape every provider maps into
//! - AggregatedPage / SearchResponse: paginated output

pub mod page;
pub mod result;

pub use page::{AggregatedPage, CacheTier, FilterParams, SearchResponse};
pub use result::{ContentKind, SourceResult};
