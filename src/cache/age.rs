//! Age Index Module
//!
//! Orders cached keys by the time they were filled, for oldest-first eviction.

use std::collections::BTreeMap;
use std::time::Instant;

// == Age Index ==
/// Tracks fill order for eviction.
///
/// Keys are ordered by `(cached_at, seq)`: the first entry is the oldest,
/// and equal timestamps fall back to insertion order.
#[derive(Debug, Default)]
pub struct AgeIndex {
    order: BTreeMap<(Instant, u64), String>,
}

impl AgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    pub fn insert(&mut self, age: (Instant, u64), key: &str) {
        self.order.insert(age, key.to_string());
    }

    // == Remove ==
    /// Removes the key recorded at `age`, if any.
    pub fn remove(&mut self, age: (Instant, u64)) {
        self.order.remove(&age);
    }

    // == Evict Oldest ==
    /// Returns and removes the oldest key.
    pub fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_first().map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}
