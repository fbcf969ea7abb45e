//! Capacity and usage snapshots.

/// Cache-wide usage snapshot.
///
/// Free bytes are summed from per-shard counters without taking shard locks,
/// so the value can lag concurrent puts slightly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheUsage {
    /// Bytes available across all shards.
    pub free_bytes: usize,
    /// Total configured capacity in bytes.
    pub capacity_bytes: usize,
}

impl CacheUsage {
    /// Resident row bytes.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.capacity_bytes.saturating_sub(self.free_bytes)
    }

    /// Fraction of capacity in use, in `[0.0, 1.0]`.
    pub fn utilization(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.capacity_bytes as f64
    }

    /// `[free_bytes, capacity_bytes]`, the layout callers forward as a
    /// two-element tensor.
    pub fn as_array(&self) -> [usize; 2] {
        [self.free_bytes, self.capacity_bytes]
    }
}

/// Usage snapshot of a single shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShardUsage {
    /// Bytes available in the shard.
    pub free_bytes: usize,
    /// Shard capacity in bytes.
    pub capacity_bytes: usize,
    /// Resident rows.
    pub items: usize,
}

impl ShardUsage {
    /// Resident row bytes.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.capacity_bytes.saturating_sub(self.free_bytes)
    }
}
