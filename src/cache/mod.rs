//! Cache Module
//!
//! Hierarchical multi-key caching: identities, pattern-indexed search parameters, the
//! engine over a storage backend, statistics, and an optional local tier.

pub mod engine;
pub mod entry;
mod identity;
mod lru;
mod parameter;
pub mod patterns;
mod single_flight;
mod stats;
mod tier;


// Re-export public types
pub use engine::{CacheEngine, CacheSettings, DegradedSearch};
pub use entry::{ttl_from_millis, CachedItem};
pub use identity::Identity;
pub use lru::LruTracker;
pub use parameter::SearchParameter;
pub use single_flight::SingleFlight;
pub use stats::{CacheStatistics, StatisticsSnapshot, TierSnapshot};
pub use tier::{LocalTier, TierLookup, TierSettings, TieredCache};
