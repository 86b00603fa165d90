//! Core caching and aggregation logic.
//!
//! This module contains:
//! - VolatileCache / DurableCache: the two cache tiers
//! - BatchCoordinator: chunked, ETag-revalidated detail lookups
//! - SourceFanoutAggregator: concurrent adapter fan-out and merge
//! - LicenseClassifier: license allow-listing and normalization
//! - Discovery: the tiered search entry point

pub mod aggregator;
pub mod batch;
pub mod cache_key;
pub mod clock;
pub mod discovery;
pub mod durable;
pub mod license;
pub mod quota;
pub mod volatile;

// Re-export commonly used types
pub use aggregator::{paginate, Merged, SourceFanoutAggregator, SourceOutcome};
pub use batch::{BatchCoordinator, BatchFailure, BatchItem, BatchOutcome, Fetched};
pub use cache_key::{cache_key, canonical_json};
pub use clock::{Clock, ManualClock, SystemClock};
pub use discovery::{CacheStats, ClearReport, Discovery, SearchRequest};
pub use durable::{CacheError, DurableCache, DurableStats};
pub use license::{CanonicalLicense, LicenseClassifier, LicenseTable};
pub use quota::{token_for, QuotaToken};
pub use volatile::{CacheEntry, VolatileCache};
