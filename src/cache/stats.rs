//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that fell through to the store (absent or expired)
    pub misses: u64,
    /// Misses caused by an entry past its TTL
    pub expired: u64,
    /// Entries removed to respect the size bound
    pub evictions: u64,
    /// Entries removed by write paths
    pub invalidations: u64,
    /// Current number of entries, expired ones included
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Counts a miss caused by expiry.
    pub fn record_expired(&mut self) {
        self.misses += 1;
        self.expired += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_invalidation(&mut self) {
        self.invalidations += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_path_counters_leave_hit_rate_alone() {
        let mut stats = CacheStats::new();
        stats.record_eviction();
        stats.record_invalidation();
        stats.record_invalidation();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.invalidations, 2);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_expired_counts_as_miss() {
        let mut stats = CacheStats::new();
        stats.record_expired();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expired, 1);
    }
}
