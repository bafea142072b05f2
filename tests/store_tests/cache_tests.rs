//! Tests for the bounded shard handle cache
//!
//! These tests verify:
//! - Entries are created once and reused
//! - The capacity bound holds under random eviction
//! - Failed opens insert nothing

use std::cell::Cell;

use filerecords::store::ShardCache;
use filerecords::RecordError;

// =============================================================================
// Reuse Tests
// =============================================================================

#[test]
fn test_open_once_then_reuse() {
    let mut cache: ShardCache<String> = ShardCache::new(4);
    let opens = Cell::new(0);

    for _ in 0..3 {
        let value = cache
            .get_or_open(7, || {
                opens.set(opens.get() + 1);
                Ok("shard-7".to_string())
            })
            .unwrap();
        assert_eq!(value.as_str(), "shard-7");
    }

    assert_eq!(opens.get(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(7));
}

#[test]
fn test_entries_are_mutable() {
    let mut cache: ShardCache<Vec<u8>> = ShardCache::new(2);
    cache.get_or_open(1, || Ok(Vec::new())).unwrap().push(42);
    assert_eq!(cache.get_mut(1).unwrap(), &vec![42]);
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[test]
fn test_capacity_bound() {
    let mut cache: ShardCache<u64> = ShardCache::new(10);

    for shard in 0..100 {
        assert_eq!(*cache.get_or_open(shard, || Ok(shard * 2)).unwrap(), shard * 2);
        assert!(cache.len() <= 10);
        // The entry just opened is never the one evicted
        assert!(cache.contains(shard));
    }
    assert_eq!(cache.len(), 10);
}

#[test]
fn test_hit_on_full_cache_does_not_evict() {
    let mut cache: ShardCache<u64> = ShardCache::new(3);
    for shard in 0..3 {
        cache.get_or_open(shard, || Ok(shard)).unwrap();
    }

    cache.get_or_open(1, || Ok(99)).unwrap();
    assert_eq!(cache.shards(), vec![0, 1, 2]);
}

#[test]
fn test_zero_capacity_holds_one() {
    let mut cache: ShardCache<u64> = ShardCache::new(0);
    assert_eq!(cache.capacity(), 1);

    cache.get_or_open(1, || Ok(1)).unwrap();
    cache.get_or_open(2, || Ok(2)).unwrap();
    assert_eq!(cache.shards(), vec![2]);
}

#[test]
fn test_remove_and_clear() {
    let mut cache: ShardCache<u64> = ShardCache::new(5);
    for shard in 0..5 {
        cache.get_or_open(shard, || Ok(shard)).unwrap();
    }

    assert_eq!(cache.remove(3), Some(3));
    assert_eq!(cache.remove(3), None);
    assert_eq!(cache.len(), 4);

    cache.clear();
    assert!(cache.is_empty());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_failed_open_inserts_nothing() {
    let mut cache: ShardCache<u64> = ShardCache::new(2);

    let result = cache.get_or_open(5, || Err(RecordError::MissingFile("x-5.idx".to_string())));
    assert!(matches!(result, Err(RecordError::MissingFile(_))));
    assert!(!cache.contains(5));
    assert!(cache.is_empty());
}
