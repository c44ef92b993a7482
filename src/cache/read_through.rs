//! Read-Through Cache
//!
//! Thread-safe wrapper around [`CacheStore`] shared by an entity store's
//! read and write paths.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::cache::{CacheStats, CacheStore};
use crate::db::Record;

/// Shared bounded TTL cache.
///
/// Every operation takes the same mutex for a short, purely in-memory
/// critical section; no store I/O happens while it is held.
#[derive(Debug)]
pub struct ReadThroughCache {
    inner: Mutex<CacheStore>,
}

impl ReadThroughCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheStore::new(max_size, ttl)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheStore> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh copy of the record cached for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Record> {
        self.lock().get(key)
    }

    /// Caches a copy of `record`, evicting the oldest entry when full.
    pub fn fill(&self, key: &str, record: &Record) {
        self.lock().fill(key, record);
    }

    /// See [`CacheStore::ticket`].
    pub fn ticket(&self) -> u64 {
        self.lock().ticket()
    }

    /// See [`CacheStore::fill_if_current`].
    pub fn fill_if_current(&self, key: &str, record: &Record, ticket: u64) -> bool {
        self.lock().fill_if_current(key, record, ticket)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().invalidate(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn sweep_expired(&self) -> usize {
        self.lock().sweep_expired()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn record(name: &str, version: u64) -> Record {
        json!({"name": name, "version": version})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_concurrent_fill_and_invalidate_never_resurrects() {
        let cache = Arc::new(ReadThroughCache::new(100, Duration::from_secs(60)));

        // Readers take a ticket, "read the store", then fill. The writer
        // invalidates after each store write. A reader whose ticket predates an
        // invalidation must not land its fill.
        let writes = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let writes = writes.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    let ticket = cache.ticket();
                    let seen = writes.load(std::sync::atomic::Ordering::SeqCst);
                    cache.fill_if_current("k", &record("k", seen), ticket);
                }
            }));
        }
        let writer = {
            let cache = cache.clone();
            let writes = writes.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    cache.invalidate("k");
                }
            })
        };
        for handle in handles {
            handle.join().unwrap();
        }
        writer.join().unwrap();

        // Whatever is cached now was read after the final write.
        if let Some(cached) = cache.get("k") {
            assert_eq!(cached["version"], json!(500));
        }
    }

    #[test]
    fn test_shared_size_bound() {
        let cache = Arc::new(ReadThroughCache::new(16, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("{}-{}", t, i);
                    cache.fill(&key, &record(&key, 0));
                    assert!(cache.len() <= 16);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
