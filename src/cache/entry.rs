//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

use crate::db::Record;

// == Cache Entry ==
/// A cached copy of one record and the moment it was cached.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached record
    pub data: Record,
    /// When the record was cached
    pub cached_at: Instant,
    /// Insertion sequence number, breaks `cached_at` ties
    pub seq: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry cached now.
    pub fn new(data: Record, seq: u64) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            seq,
        }
    }

    /// Position of this entry in eviction order.
    pub fn age_key(&self) -> (Instant, u64) {
        (self.cached_at, self.seq)
    }

    // == Is Expired ==
    /// Checks whether the entry can no longer be trusted at `now`.
    ///
    /// Boundary condition: an entry whose age equals the TTL is expired.
    pub fn is_expired_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.cached_at) >= ttl
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(Instant::now(), ttl)
    }
}
