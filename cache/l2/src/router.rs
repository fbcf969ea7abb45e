//! Shard selection for row identifiers.
//!
//! Routing must be identical for reads and writes for the lifetime of a
//! cache, and it must not depend on per-process hasher seeds, so this uses a
//! fixed 64-bit finalizer rather than the randomized hasher that backs the
//! per-shard index.

/// Maps row identifiers onto a fixed number of shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    shards: usize,
}

impl ShardRouter {
    /// Create a router over `shards` shards.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is zero. The cache builder rejects that earlier
    /// with a `ConfigError`.
    pub fn new(shards: usize) -> Self {
        assert!(shards > 0, "shard count must be positive");
        Self { shards }
    }

    /// Number of shards this router distributes over.
    #[inline]
    pub fn shards(&self) -> usize {
        self.shards
    }

    /// Shard index for a row identifier.
    #[inline]
    pub fn shard_of(&self, key: i64) -> usize {
        hash_shard(key, self.shards)
    }
}

/// Hash a row identifier onto `[0, shards)`.
///
/// The key is mixed with the murmur3 64-bit finalizer and then reduced with a
/// multiply-shift, which avoids the modulo bias and keeps sequential keys well
/// spread.
#[inline]
pub fn hash_shard(key: i64, shards: usize) -> usize {
    let hash = mix64(key as u64);
    ((hash as u128 * shards as u128) >> 64) as usize
}

#[inline]
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}
