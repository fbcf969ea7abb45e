//! Error types for cache operations and construction.

use std::fmt;

/// Errors that can occur during cache operations.
///
/// None of these are fatal. A failed `put` leaves the owning shard exactly as
/// it was before the call, so the caller can skip the row and serve it from
/// the backing tier instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// The row does not fit in its shard even after evicting every other
    /// resident row, or capture buffers could not be allocated.
    AllocationFailure,

    /// The bound eviction capture has no room for the evictions this put
    /// would cause. The capture buffers were sized too small for the cycle.
    CaptureOverflow,

    /// A capture cycle was requested with a zero row width, or the buffer
    /// size overflows.
    InvalidRowWidth,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure => write!(f, "allocation failure"),
            Self::CaptureOverflow => write!(f, "eviction capture buffer full"),
            Self::InvalidRowWidth => write!(f, "invalid capture row width"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Construction-time misconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No shards were requested.
    #[error("shard count must be at least 1")]
    ZeroShards,
    /// No capacity was requested.
    #[error("cache capacity must be greater than zero")]
    ZeroCapacity,
    /// Some shard would end up with zero bytes.
    #[error("capacity of {capacity} bytes cannot be split across {shards} shards")]
    CapacityTooSmall {
        /// Requested total capacity in bytes.
        capacity: usize,
        /// Requested shard count.
        shards: usize,
    },
}
