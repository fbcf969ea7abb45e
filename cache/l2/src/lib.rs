//! Sharded host-memory cache for embedding rows with eviction capture.
//!
//! This crate is the second tier between a device-resident row cache and a
//! slower backing store. Rows are opaque byte blobs keyed by `i64` row id.
//! When a put has to make room, the evicted rows are copied into an
//! [`EvictionCapture`] bound for the current cycle so the caller can forward
//! them to the backing store instead of losing them.
//!
//! # Architecture
//!
//! ```text
//! +-----------------------------------------------+
//! |                   L2Cache                     |
//! |                                               |
//! |  ShardRouter: key -> shard (fmix64 + mulshift) |
//! |        |                                      |
//! |        v                                      |
//! |  +-----------+ +-----------+     +-----------+ |
//! |  | Shard 0   | | Shard 1   | ... | Shard N-1 | |
//! |  | Mutex<    | | Mutex<    |     | Mutex<    | |
//! |  |  RowStore>| |  RowStore>|     |  RowStore>| |
//! |  | LRU list  | | LRU list  |     | LRU list  | |
//! |  +-----+-----+ +-----+-----+     +-----+-----+ |
//! |        |  evicted rows |               |       |
//! |        v               v               v       |
//! |  RwLock<Option<EvictionCapture>>               |
//! |  keys [k0 k1 k2 -1 ...] rows [r0 r1 r2 ...]    |
//! |  cursor (atomic, shared by all shards)         |
//! +-----------------------------------------------+
//! ```
//!
//! # Cycles
//!
//! ```ignore
//! use l2_cache::{ElementType, L2Cache};
//!
//! let cache = L2Cache::new(64 * 1024 * 1024, 16)?;
//! cache.begin_cycle(4096, 128, ElementType::F32)?;
//!
//! // lookups and puts from any number of threads
//! if cache.get(42).is_none() {
//!     cache.put(42, &row)?;
//! }
//!
//! // between batches, on one thread
//! if let Some(evicted) = cache.drain() {
//!     for (key, row) in evicted.iter() {
//!         backing.write(key, row);
//!     }
//! }
//! cache.reset_cycle();
//! ```
//!
//! # Locking
//!
//! `put` holds the read side of the capture lock and then one shard lock.
//! `begin_cycle`, `reset_cycle`, `drain` and `end_cycle` take the write side,
//! so they wait for in-flight puts and observe a quiescent capture. A
//! [`RowRef`] holds its shard lock until dropped.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
mod capture;
mod config;
mod element;
mod error;
pub mod metrics;
mod router;
mod store;
mod usage;

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard, RwLock};

pub use capture::{CaptureReservation, EMPTY_KEY, EvictedRows, EvictionCapture};
pub use config::{L2CacheConfig, parse_size};
pub use element::ElementType;
pub use error::{CacheError, CacheResult, ConfigError};
pub use router::{ShardRouter, hash_shard};
pub use store::RowStore;
pub use usage::{CacheUsage, ShardUsage};

use metrics::{CAPTURE_OVERFLOW, EVICT_CAPTURED, EVICT_UNCAPTURED, GET, HIT, MISS, PUT, PUT_EX};

/// One shard: the store plus lock-free usage counters mirrored after every
/// mutation.
struct Shard {
    store: Mutex<RowStore>,
    capacity: usize,
    free: AtomicUsize,
    items: AtomicUsize,
}

impl Shard {
    fn new(capacity: usize) -> Self {
        Self {
            store: Mutex::new(RowStore::new(capacity)),
            capacity,
            free: AtomicUsize::new(capacity),
            items: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn publish(&self, store: &RowStore) {
        self.free.store(store.free(), Ordering::Relaxed);
        self.items.store(store.len(), Ordering::Relaxed);
    }

    fn usage(&self) -> ShardUsage {
        ShardUsage {
            free_bytes: self.free.load(Ordering::Relaxed),
            capacity_bytes: self.capacity,
            items: self.items.load(Ordering::Relaxed),
        }
    }
}

/// Sharded LRU row cache with per-cycle eviction capture.
pub struct L2Cache {
    shards: Box<[Shard]>,
    router: ShardRouter,
    capacity: usize,
    capture: RwLock<Option<EvictionCapture>>,
}

impl L2Cache {
    /// Create a new builder.
    pub fn builder() -> L2CacheBuilder {
        L2CacheBuilder::new()
    }

    /// Create a cache of `capacity` bytes split evenly over `shards` shards.
    pub fn new(capacity: usize, shards: usize) -> Result<Self, ConfigError> {
        L2CacheBuilder::new()
            .capacity(capacity)
            .shards(shards)
            .build()
    }

    /// Create a cache from a deserialized configuration.
    pub fn from_config(config: &L2CacheConfig) -> Result<Self, ConfigError> {
        let capacities = config.shard_capacities()?;
        let shards: Box<[Shard]> = capacities.into_iter().map(Shard::new).collect();

        tracing::debug!(
            capacity = config.capacity,
            shards = shards.len(),
            "Created L2 cache"
        );

        Ok(Self {
            router: ShardRouter::new(shards.len()),
            shards,
            capacity: config.capacity,
            capture: RwLock::new(None),
        })
    }

    /// Total configured capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of shards.
    #[inline]
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Shard that owns `key`.
    #[inline]
    pub fn shard_of(&self, key: i64) -> usize {
        self.router.shard_of(key)
    }

    #[inline]
    fn shard(&self, key: i64) -> &Shard {
        &self.shards[self.router.shard_of(key)]
    }

    /// Look up a row, marking it most recently used.
    ///
    /// The returned [`RowRef`] holds the owning shard's lock. Drop it before
    /// calling `put`, `contains` or any cycle operation from the same thread.
    pub fn get(&self, key: i64) -> Option<RowRef<'_>> {
        GET.increment();

        let guard = self.shard(key).store.lock();
        match MutexGuard::try_map(guard, |store| store.get_mut(key)) {
            Ok(row) => {
                HIT.increment();
                Some(RowRef { row })
            }
            Err(_) => {
                MISS.increment();
                None
            }
        }
    }

    /// Access a row through a closure, marking it most recently used.
    pub fn with_row<F, R>(&self, key: i64, f: F) -> Option<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.get(key).map(|row| f(&row))
    }

    /// Returns true if `key` is resident. Does not touch recency.
    pub fn contains(&self, key: i64) -> bool {
        self.shard(key).store.lock().contains(key)
    }

    /// Insert or replace a row.
    ///
    /// If the owning shard must evict to make room and a cycle is active, the
    /// evicted rows are appended to the cycle's capture. On error the shard
    /// is left unchanged.
    pub fn put(&self, key: i64, row: &[u8]) -> CacheResult<()> {
        PUT.increment();

        let capture = self.capture.read();
        let shard = self.shard(key);

        let result = {
            let mut store = shard.store.lock();
            let result = store.put(key, row, capture.as_ref());
            shard.publish(&store);
            result
        };

        match result {
            Ok(0) => Ok(()),
            Ok(evicted) => {
                if capture.is_some() {
                    EVICT_CAPTURED.add(evicted as u64);
                } else {
                    EVICT_UNCAPTURED.add(evicted as u64);
                    tracing::trace!(key, evicted, "Evicted rows with no capture bound");
                }
                Ok(())
            }
            Err(e) => {
                PUT_EX.increment();
                if e == CacheError::CaptureOverflow {
                    CAPTURE_OVERFLOW.increment();
                }
                tracing::warn!(key, len = row.len(), error = %e, "Put rejected");
                Err(e)
            }
        }
    }

    /// Cache-wide usage, read without taking shard locks.
    pub fn usage(&self) -> CacheUsage {
        let free_bytes = self
            .shards
            .iter()
            .map(|shard| shard.free.load(Ordering::Relaxed))
            .sum();

        CacheUsage {
            free_bytes,
            capacity_bytes: self.capacity,
        }
    }

    /// Usage of a single shard, or `None` if `shard` is out of range.
    pub fn shard_usage(&self, shard: usize) -> Option<ShardUsage> {
        self.shards.get(shard).map(Shard::usage)
    }

    /// Number of resident rows across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.items.load(Ordering::Relaxed))
            .sum()
    }

    /// Returns true if no rows are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind a fresh capture for up to `max_evictions` rows of `row_width`
    /// elements of `element`.
    ///
    /// Any previously bound capture is dropped along with rows it still held.
    pub fn begin_cycle(
        &self,
        max_evictions: usize,
        row_width: usize,
        element: ElementType,
    ) -> CacheResult<()> {
        let capture = EvictionCapture::new(max_evictions, row_width, element)?;

        let previous = self.capture.write().replace(capture);
        if let Some(previous) = previous
            && !previous.is_empty()
        {
            tracing::warn!(
                discarded = previous.len(),
                "Replaced capture with undrained evictions"
            );
        }

        tracing::debug!(max_evictions, row_width, %element, "Began eviction cycle");
        Ok(())
    }

    /// Rewind the bound capture for the next cycle. No-op if no cycle is
    /// bound.
    pub fn reset_cycle(&self) {
        if let Some(capture) = self.capture.write().as_mut() {
            capture.reset();
            tracing::debug!("Reset eviction cycle");
        }
    }

    /// Copy out the rows captured so far this cycle.
    ///
    /// Does not rewind the capture; call [`reset_cycle`](Self::reset_cycle)
    /// once the rows have been forwarded. Returns `None` if no cycle is bound.
    pub fn drain(&self) -> Option<EvictedRows> {
        let rows = self.capture.write().as_mut().map(EvictionCapture::snapshot)?;
        tracing::debug!(evicted = rows.len(), "Drained eviction capture");
        Some(rows)
    }

    /// Unbind the capture, returning whatever it still held. Later evictions
    /// are dropped until the next `begin_cycle`.
    pub fn end_cycle(&self) -> Option<EvictedRows> {
        let mut capture = self.capture.write().take()?;
        tracing::debug!(evicted = capture.len(), "Ended eviction cycle");
        Some(capture.snapshot())
    }

    /// Rows captured so far this cycle, or zero if no cycle is bound.
    pub fn captured(&self) -> usize {
        self.capture.read().as_ref().map_or(0, EvictionCapture::len)
    }
}

impl std::fmt::Debug for L2Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L2Cache")
            .field("capacity", &self.capacity)
            .field("shards", &self.shards.len())
            .field("usage", &self.usage())
            .finish()
    }
}

/// Borrowed view of a cached row.
///
/// Holds the owning shard's lock until dropped.
pub struct RowRef<'a> {
    row: MappedMutexGuard<'a, [u8]>,
}

impl Deref for RowRef<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.row
    }
}

impl AsRef<[u8]> for RowRef<'_> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.row
    }
}

impl std::fmt::Debug for RowRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowRef").field("len", &self.row.len()).finish()
    }
}

/// Builder for [`L2Cache`].
#[derive(Debug, Clone)]
pub struct L2CacheBuilder {
    config: L2CacheConfig,
}

impl Default for L2CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl L2CacheBuilder {
    /// Create a builder with default settings (1GB, 16 shards).
    pub fn new() -> Self {
        Self {
            config: L2CacheConfig::default(),
        }
    }

    /// Set the total capacity in bytes.
    pub fn capacity(mut self, bytes: usize) -> Self {
        self.config.capacity = bytes;
        self
    }

    /// Set the number of shards.
    pub fn shards(mut self, shards: usize) -> Self {
        self.config.shards = shards;
        self
    }

    /// Build the cache.
    pub fn build(self) -> Result<L2Cache, ConfigError> {
        L2Cache::from_config(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: i64, len: usize) -> Vec<u8> {
        (0..len).map(|i| (key as u8) ^ (i as u8)).collect()
    }

    fn create_test_cache() -> L2Cache {
        L2CacheBuilder::new()
            .capacity(64 * 1024)
            .shards(4)
            .build()
            .expect("Failed to create test cache")
    }

    #[test]
    fn test_builder_errors() {
        assert_eq!(L2Cache::new(1024, 0).unwrap_err(), ConfigError::ZeroShards);
        assert_eq!(L2Cache::new(0, 4).unwrap_err(), ConfigError::ZeroCapacity);
        assert!(matches!(
            L2Cache::new(2, 4),
            Err(ConfigError::CapacityTooSmall { .. })
        ));
    }

    #[test]
    fn test_put_get() {
        let cache = create_test_cache();
        cache.put(1, &row(1, 128)).unwrap();

        let value = cache.get(1).expect("row should be resident");
        assert_eq!(&*value, &row(1, 128)[..]);
        drop(value);

        assert!(cache.get(2).is_none());
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_with_row() {
        let cache = create_test_cache();
        cache.put(5, &[1, 2, 3]).unwrap();

        let sum = cache.with_row(5, |r| r.iter().map(|&b| b as u32).sum::<u32>());
        assert_eq!(sum, Some(6));
        assert_eq!(cache.with_row(6, |r| r.len()), None);
    }

    #[test]
    fn test_replace_changes_length() {
        let cache = create_test_cache();
        cache.put(1, &row(1, 100)).unwrap();
        cache.put(1, &row(2, 10)).unwrap();

        assert_eq!(cache.get(1).unwrap().as_ref(), &row(2, 10)[..]);
        assert_eq!(cache.usage().used_bytes(), 10);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_usage() {
        let cache = create_test_cache();
        assert_eq!(
            cache.usage(),
            CacheUsage {
                free_bytes: 64 * 1024,
                capacity_bytes: 64 * 1024
            }
        );

        cache.put(9, &row(9, 256)).unwrap();
        assert_eq!(cache.usage().free_bytes, 64 * 1024 - 256);

        let shard = cache.shard_of(9);
        let usage = cache.shard_usage(shard).unwrap();
        assert_eq!(usage.items, 1);
        assert_eq!(usage.used_bytes(), 256);
        assert_eq!(usage.capacity_bytes, 16 * 1024);
        assert!(cache.shard_usage(4).is_none());
    }

    #[test]
    fn test_too_large_row() {
        let cache = create_test_cache();
        assert_eq!(
            cache.put(1, &vec![0u8; 16 * 1024 + 1]),
            Err(CacheError::AllocationFailure)
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_touches_recency() {
        // single shard so every key competes for the same space
        let cache = L2Cache::new(256, 1).unwrap();
        for key in 0..4 {
            cache.put(key, &row(key, 64)).unwrap();
        }

        drop(cache.get(0));
        cache.put(4, &row(4, 64)).unwrap();

        assert!(cache.contains(0));
        assert!(!cache.contains(1));
    }

    #[test]
    fn test_evictions_without_cycle_are_dropped() {
        let cache = L2Cache::new(128, 1).unwrap();
        for key in 0..4 {
            cache.put(key, &row(key, 64)).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.drain().is_none());
        assert_eq!(cache.captured(), 0);
    }

    #[test]
    fn test_cycle_captures_evictions() {
        let cache = L2Cache::new(128, 1).unwrap();
        cache.begin_cycle(8, 16, ElementType::F32).unwrap();

        for key in 0..4 {
            cache.put(key, &row(key, 64)).unwrap();
        }
        assert_eq!(cache.captured(), 2);

        let evicted = cache.drain().unwrap();
        assert_eq!(evicted.keys(), &[0, 1]);
        assert_eq!(evicted.row(0), Some(&row(0, 64)[..]));
        assert_eq!(evicted.row(1), Some(&row(1, 64)[..]));

        // drain does not rewind
        assert_eq!(cache.drain().unwrap().len(), 2);

        cache.reset_cycle();
        assert!(cache.drain().unwrap().is_empty());

        cache.put(10, &row(10, 64)).unwrap();
        let evicted = cache.end_cycle().unwrap();
        assert_eq!(evicted.keys(), &[2]);
        assert!(cache.drain().is_none());
    }

    #[test]
    fn test_begin_cycle_rejects_zero_width() {
        let cache = create_test_cache();
        assert_eq!(
            cache.begin_cycle(8, 0, ElementType::F32),
            Err(CacheError::InvalidRowWidth)
        );
        assert!(cache.drain().is_none());
    }

    #[test]
    fn test_capture_overflow_rejects_put() {
        let cache = L2Cache::new(128, 1).unwrap();
        cache.begin_cycle(1, 64, ElementType::U8).unwrap();

        cache.put(0, &row(0, 64)).unwrap();
        cache.put(1, &row(1, 64)).unwrap();
        cache.put(2, &row(2, 64)).unwrap();
        assert_eq!(cache.captured(), 1);

        // capture is full: the put fails and nothing is lost
        assert_eq!(cache.put(3, &row(3, 64)), Err(CacheError::CaptureOverflow));
        assert!(cache.contains(1));
        assert!(cache.contains(2));
        assert!(!cache.contains(3));

        // after forwarding and resetting, the put succeeds
        assert_eq!(cache.drain().unwrap().keys(), &[0]);
        cache.reset_cycle();
        cache.put(3, &row(3, 64)).unwrap();
        assert_eq!(cache.drain().unwrap().keys(), &[1]);
    }

    #[test]
    fn test_from_config() {
        let config: L2CacheConfig = toml::from_str(
            r#"
            capacity = "10B"
            shards = 4
            "#,
        )
        .unwrap();
        let cache = L2Cache::from_config(&config).unwrap();

        let capacities: Vec<usize> = (0..cache.num_shards())
            .map(|i| cache.shard_usage(i).unwrap().capacity_bytes)
            .collect();
        assert_eq!(capacities, vec![3, 3, 2, 2]);
        assert_eq!(cache.capacity(), 10);
    }
}
