//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache's fill, expiry, bound and eviction rules.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::thread::sleep;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::db::Record;

// == Test Configuration ==
const TEST_MAX_SIZE: usize = 100;
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Generates natural keys
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z ]{0,31}".prop_map(|s| s)
}

/// Generates small records
fn record_strategy() -> impl Strategy<Value = Record> {
    (key_strategy(), "[A-Z]{2}", 0u64..10_000_000).prop_map(|(name, code, population)| {
        record(json!({"name": name, "state_code": code, "population": population}))
    })
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Fill { key: String, record: Record },
    Get { key: String },
    Invalidate { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), record_strategy()).prop_map(|(key, record)| CacheOp::Fill { key, record }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Invalidate { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Immediately after fill(k, r), get(k) returns an equal copy of r.
    #[test]
    fn prop_fill_then_get(key in key_strategy(), rec in record_strategy()) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_TTL);

        store.fill(&key, &rec);

        let cached = store.get(&key);
        prop_assert_eq!(cached, Some(rec), "fill/get mismatch");
    }

    // After invalidate(k), get(k) misses.
    #[test]
    fn prop_invalidate_removes_entry(key in key_strategy(), rec in record_strategy()) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_TTL);

        store.fill(&key, &rec);
        prop_assert!(store.get(&key).is_some());

        store.invalidate(&key);
        prop_assert!(store.get(&key).is_none(), "invalidated key still served");
        prop_assert!(!store.contains(&key));
    }

    // Hits and misses add up to the number of lookups, and agree with a model.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_TTL);
        let mut model: HashSet<String> = HashSet::new();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Fill { key, record } => {
                    store.fill(&key, &record);
                    model.insert(key);
                }
                CacheOp::Get { key } => {
                    let hit = store.get(&key).is_some();
                    prop_assert_eq!(hit, model.contains(&key));
                    if hit { expected_hits += 1 } else { expected_misses += 1 }
                }
                CacheOp::Invalidate { key } => {
                    store.invalidate(&key);
                    model.remove(&key);
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_entries, store.len(), "Total entries mismatch");
    }

    // The cache never holds more than its configured maximum.
    #[test]
    fn prop_size_bound(
        entries in prop::collection::vec((key_strategy(), record_strategy()), 1..200)
    ) {
        let max_size = 50;
        let mut store = CacheStore::new(max_size, TEST_TTL);

        for (key, rec) in entries {
            store.fill(&key, &rec);
            prop_assert!(
                store.len() <= max_size,
                "Cache size {} exceeds max {}",
                store.len(),
                max_size
            );
        }
    }

    // Inserting the N+1th distinct key removes exactly the entry filled first.
    #[test]
    fn prop_oldest_fill_evicted(
        initial_keys in prop::collection::vec(key_strategy(), 2..10),
        new_key in key_strategy(),
        rec in record_strategy()
    ) {
        let mut seen = HashSet::new();
        let unique_keys: Vec<String> = initial_keys
            .into_iter()
            .filter(|k| seen.insert(k.clone()))
            .collect();
        prop_assume!(unique_keys.len() >= 2);
        prop_assume!(!unique_keys.contains(&new_key));

        let capacity = unique_keys.len();
        let mut store = CacheStore::new(capacity, TEST_TTL);
        for key in &unique_keys {
            store.fill(key, &rec);
        }
        // Lookups do not change eviction order.
        for key in unique_keys.iter().rev() {
            store.get(key);
        }

        let evicted = store.fill(&new_key, &rec);

        prop_assert_eq!(evicted.as_ref(), Some(&unique_keys[0]));
        prop_assert_eq!(store.len(), capacity);
        prop_assert!(!store.contains(&unique_keys[0]));
        for key in &unique_keys[1..] {
            prop_assert!(store.contains(key), "survivor {} missing", key);
        }
        prop_assert!(store.contains(&new_key));
    }
}

// Separate proptest block with fewer cases for time-sensitive TTL tests
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    // Once the TTL has elapsed, get(k) misses while the entry stays present.
    #[test]
    fn prop_ttl_expiry_is_lazy(key in key_strategy(), rec in record_strategy()) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, Duration::from_millis(50));

        store.fill(&key, &rec);
        prop_assert!(store.get(&key).is_some(), "Entry should be fresh before TTL");

        sleep(Duration::from_millis(70));

        prop_assert!(store.get(&key).is_none(), "Entry trusted after TTL");
        prop_assert!(store.contains(&key), "Expired entry removed eagerly");
    }
}
