//! End-to-end tests for eviction capture across shards and threads.

use std::collections::HashSet;
use std::sync::Arc;

use l2_cache::{CacheError, CacheUsage, ElementType, L2Cache, L2CacheBuilder};

const ROW_WIDTH: usize = 16;
const ROW_BYTES: usize = ROW_WIDTH * 4;

/// Row contents derived from the key so captured bytes can be checked.
fn row_for(key: i64) -> Vec<u8> {
    let seed = key.to_le_bytes();
    (0..ROW_BYTES).map(|i| seed[i % 8] ^ (i as u8)).collect()
}

#[test]
fn test_sequential_fill_captures_overflow_per_shard() {
    let shards = 4;
    let shard_capacity = 4096;
    let rows_per_shard = (shard_capacity / ROW_BYTES) as i64;
    let keys = 300i64;

    let cache = L2CacheBuilder::new()
        .capacity(shards * shard_capacity)
        .shards(shards)
        .build()
        .expect("Failed to create cache");
    cache
        .begin_cycle(keys as usize, ROW_WIDTH, ElementType::F32)
        .unwrap();

    for key in 0..keys {
        cache.put(key, &row_for(key)).unwrap();
    }

    // keys each shard received, in insertion order
    let mut per_shard: Vec<Vec<i64>> = vec![Vec::new(); shards];
    for key in 0..keys {
        per_shard[cache.shard_of(key)].push(key);
    }

    let expected: usize = per_shard
        .iter()
        .map(|k| (k.len() as i64 - rows_per_shard).max(0) as usize)
        .sum();

    let evicted = cache.drain().unwrap();
    assert_eq!(evicted.len(), expected);

    // each put into a full shard evicts that shard's oldest key, and the
    // capture records them in put order
    let mut filled = vec![0usize; shards];
    let mut expected_keys = Vec::with_capacity(expected);
    for key in 0..keys {
        let shard = cache.shard_of(key);
        filled[shard] += 1;
        if filled[shard] > rows_per_shard as usize {
            expected_keys.push(per_shard[shard][filled[shard] - 1 - rows_per_shard as usize]);
        }
    }
    assert_eq!(evicted.keys(), &expected_keys[..]);

    for (key, bytes) in evicted.iter() {
        assert_eq!(bytes, &row_for(key)[..], "row bytes for key {}", key);
        assert!(!cache.contains(key));
    }

    for (shard, shard_keys) in per_shard.iter().enumerate() {
        let usage = cache.shard_usage(shard).unwrap();
        let resident = shard_keys.len().min(rows_per_shard as usize);
        assert_eq!(usage.items, resident);
        assert_eq!(usage.free_bytes, shard_capacity - resident * ROW_BYTES);
    }

    assert_eq!(cache.len() + evicted.len(), keys as usize);
}

#[test]
fn test_reset_then_drain_is_empty() {
    let cache = L2Cache::new(4 * ROW_BYTES, 1).unwrap();
    cache.begin_cycle(16, ROW_WIDTH, ElementType::F32).unwrap();

    for key in 0..8 {
        cache.put(key, &row_for(key)).unwrap();
    }
    assert_eq!(cache.captured(), 4);

    cache.reset_cycle();
    let evicted = cache.drain().unwrap();
    assert!(evicted.is_empty());
    assert!(evicted.keys().is_empty());
    assert!(evicted.rows().is_empty());

    assert_eq!(evicted.capacity(), 16);
    let (keys, rows) = evicted.into_padded();
    assert_eq!(keys, vec![-1; 16]);
    assert_eq!(rows.len(), 16 * ROW_BYTES);

    // resetting again changes nothing
    cache.reset_cycle();
    assert!(cache.drain().unwrap().is_empty());
}

#[test]
fn test_concurrent_puts_capture_every_eviction_once() {
    let threads = 8;
    let per_thread = 2_000i64;
    let total = threads as i64 * per_thread;

    let cache = Arc::new(L2Cache::new(16 * 1024, 8).unwrap());
    cache
        .begin_cycle(total as usize, ROW_WIDTH, ElementType::F32)
        .unwrap();

    let handles: Vec<_> = (0..threads as i64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..per_thread {
                    let key = t * per_thread + i;
                    cache.put(key, &row_for(key)).unwrap();
                    if i % 7 == 0 {
                        let _ = cache.get(key - 3);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let evicted = cache.end_cycle().unwrap();
    let mut seen = HashSet::with_capacity(evicted.len());
    for (key, bytes) in evicted.iter() {
        assert!(seen.insert(key), "key {} captured twice", key);
        assert_eq!(bytes, &row_for(key)[..]);
        assert!(!cache.contains(key));
    }

    // every key is either resident or was captured, never both or neither
    for key in 0..total {
        assert!(
            cache.contains(key) ^ seen.contains(&key),
            "key {} lost or duplicated",
            key
        );
    }

    let CacheUsage {
        free_bytes,
        capacity_bytes,
    } = cache.usage();
    assert_eq!(capacity_bytes, 16 * 1024);
    assert_eq!(capacity_bytes - free_bytes, cache.len() * ROW_BYTES);
}

#[test]
fn test_undersized_capture_rejects_instead_of_overrunning() {
    let cache = L2Cache::new(2 * ROW_BYTES, 1).unwrap();
    cache.begin_cycle(2, ROW_WIDTH, ElementType::F32).unwrap();

    let mut failures = 0;
    for key in 0..10 {
        if cache.put(key, &row_for(key)).is_err() {
            failures += 1;
        }
    }

    assert_eq!(cache.captured(), 2);
    assert_eq!(failures, 6);
    // the two oldest resident rows survived the rejected puts
    assert!(cache.contains(2));
    assert!(cache.contains(3));

    let evicted = cache.drain().unwrap();
    assert_eq!(evicted.keys(), &[0, 1]);
}

#[test]
fn test_off_stride_rows_do_not_block_eviction() {
    let cache = L2Cache::new(4 * ROW_BYTES, 1).unwrap();
    cache.put(1000, &[7u8; 32]).unwrap();
    cache.put(1001, &[]).unwrap();
    cache.put(1002, &[9u8; 2 * ROW_BYTES]).unwrap();
    cache.begin_cycle(1000, ROW_WIDTH, ElementType::F32).unwrap();

    for key in 0..500 {
        cache.put(key, &row_for(key)).unwrap();
    }
    assert!(!cache.contains(1000));
    assert!(!cache.contains(1001));
    assert!(!cache.contains(1002));

    let evicted = cache.drain().unwrap();
    assert_eq!(&evicted.keys()[..3], &[1000, 1001, 1002]);

    let mut padded = vec![7u8; 32];
    padded.resize(ROW_BYTES, 0);
    assert_eq!(evicted.row(0), Some(&padded[..]));
    assert_eq!(evicted.row(1), Some(&[0u8; ROW_BYTES][..]));
    assert_eq!(evicted.row(2), Some(&[9u8; ROW_BYTES][..]));

    for (key, bytes) in evicted.iter().skip(3) {
        assert_eq!(bytes, &row_for(key)[..]);
    }
    assert_eq!(evicted.len(), 3 + 500 - 4);
}

#[test]
fn test_oversized_cycle_is_rejected() {
    let cache = L2Cache::new(ROW_BYTES, 1).unwrap();
    assert_eq!(
        cache.begin_cycle(usize::MAX / 4, 1, ElementType::U8),
        Err(CacheError::InvalidRowWidth)
    );
    assert!(cache.drain().is_none());
}
