//! Cache managers over object store partitions.
//!
//! `CacheManager` wraps a partition with an age-based freshness policy:
//! entries are fresh while younger than the cache length, and stale copies
//! remain available as a fallback.
//!
//! `TimedCacheManager` specializes the policy for entities tied to a
//! scheduled time: once the scheduled time is far enough in the past, the
//! entry becomes permanently fresh and stops generating upstream traffic.

pub mod manager;

pub use manager::{CacheManager, CacheResult, CachedObject, TimedCacheManager, TimedCachedObject};
