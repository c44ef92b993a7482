//! Cache Module
//!
//! Bounded in-memory record cache with lazy TTL expiry and oldest-fill eviction.

mod age;
mod entry;
mod read_through;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use age::AgeIndex;
pub use entry::CacheEntry;
pub use read_through::ReadThroughCache;
pub use stats::CacheStats;
pub use store::CacheStore;
