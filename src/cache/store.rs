//! Cache Store Module
//!
//! Single-threaded cache engine: HashMap storage, fill-age ordering for
//! eviction, and lazy TTL expiry. [`ReadThroughCache`](super::ReadThroughCache)
//! wraps it in a mutex for shared use.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cache::{AgeIndex, CacheEntry, CacheStats};
use crate::db::Record;

// == Cache Store ==
/// Bounded TTL record cache.
#[derive(Debug)]
pub struct CacheStore {
    /// Cached records by natural key
    entries: HashMap<String, CacheEntry>,
    /// Fill-order index for eviction
    ages: AgeIndex,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed, 0 disables caching
    max_size: usize,
    /// Maximum age at which an entry is trusted
    ttl: Duration,
    /// Next insertion sequence number
    next_seq: u64,
    /// Number of invalidations so far, see [`CacheStore::ticket`]
    invalidation_epoch: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a cache holding at most `max_size` entries trusted for `ttl`.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ages: AgeIndex::new(),
            stats: CacheStats::new(),
            max_size,
            ttl,
            next_seq: 0,
            invalidation_epoch: 0,
        }
    }

    // == Get ==
    /// Returns a copy of the record cached for `key` if it is still fresh.
    ///
    /// An expired entry is reported as a miss but stays in place until it is
    /// overwritten, evicted, invalidated or swept.
    pub fn get(&mut self, key: &str) -> Option<Record> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(self.ttl) => {
                self.stats.record_expired();
                None
            }
            Some(entry) => {
                self.stats.record_hit();
                Some(entry.data.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Fill ==
    /// Caches a copy of `record` under `key`.
    ///
    /// When the cache is full and `key` is new, the entry with the oldest
    /// fill time is evicted first. Returns the evicted key, if any.
    pub fn fill(&mut self, key: &str, record: &Record) -> Option<String> {
        if self.max_size == 0 {
            return None;
        }

        let mut evicted = None;
        if let Some(previous) = self.entries.remove(key) {
            self.ages.remove(previous.age_key());
        } else if self.entries.len() >= self.max_size {
            if let Some(oldest) = self.ages.pop_oldest() {
                self.entries.remove(&oldest);
                self.stats.record_eviction();
                debug!("Evicted cache entry '{}'", oldest);
                evicted = Some(oldest);
            }
        }

        let entry = CacheEntry::new(record.clone(), self.next_seq);
        self.next_seq += 1;
        self.ages.insert(entry.age_key(), key);
        self.entries.insert(key.to_string(), entry);
        self.stats.set_total_entries(self.entries.len());

        evicted
    }

    // == Tickets ==
    /// Snapshot of the invalidation counter, taken before a store read.
    pub fn ticket(&self) -> u64 {
        self.invalidation_epoch
    }

    /// Fills only if no invalidation happened since `ticket` was taken.
    ///
    /// A read that raced with a write would otherwise put back the value the
    /// write just invalidated. Returns whether the record was cached.
    pub fn fill_if_current(&mut self, key: &str, record: &Record, ticket: u64) -> bool {
        if ticket != self.invalidation_epoch || self.max_size == 0 {
            return false;
        }
        self.fill(key, record);
        true
    }

    // == Invalidate ==
    /// Removes any entry for `key`. Returns whether one was present.
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.invalidation_epoch += 1;
        match self.entries.remove(key) {
            Some(entry) => {
                self.ages.remove(entry.age_key());
                self.stats.record_invalidation();
                self.stats.set_total_entries(self.entries.len());
                true
            }
            None => false,
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.invalidation_epoch += 1;
        self.entries.clear();
        self.ages.clear();
        self.stats.set_total_entries(0);
    }

    // == Sweep Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now, ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = self.entries.remove(key) {
                self.ages.remove(entry.age_key());
            }
        }

        self.stats.set_total_entries(self.entries.len());
        expired.len()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// True when an entry for `key` is physically present, fresh or not.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
