//! Cache metrics.

use metriken::{Counter, Gauge, metric};

/// Lookups.
#[metric(name = "l2_get", description = "Row lookups")]
pub static GET: Counter = Counter::new();

/// Lookups that found a resident row.
#[metric(name = "l2_hit", description = "Lookups that found a resident row")]
pub static HIT: Counter = Counter::new();

/// Lookups that found nothing.
#[metric(name = "l2_miss", description = "Lookups that found no row")]
pub static MISS: Counter = Counter::new();

/// Insert or replace attempts.
#[metric(name = "l2_put", description = "Insert or replace attempts")]
pub static PUT: Counter = Counter::new();

/// Puts rejected for any reason.
#[metric(name = "l2_put_ex", description = "Rejected puts")]
pub static PUT_EX: Counter = Counter::new();

/// Evicted rows written to a bound capture.
#[metric(
    name = "l2_evict_captured",
    description = "Evicted rows written to the bound capture"
)]
pub static EVICT_CAPTURED: Counter = Counter::new();

/// Evicted rows dropped because no capture was bound.
#[metric(
    name = "l2_evict_uncaptured",
    description = "Evicted rows dropped with no capture bound"
)]
pub static EVICT_UNCAPTURED: Counter = Counter::new();

/// Puts rejected because the capture had no room for their evictions.
#[metric(
    name = "l2_capture_overflow",
    description = "Puts rejected because the capture was full"
)]
pub static CAPTURE_OVERFLOW: Counter = Counter::new();

/// Captured rows padded or truncated to the capture stride.
#[metric(
    name = "l2_capture_width_mismatch",
    description = "Captured rows whose length differed from the capture stride"
)]
pub static CAPTURE_WIDTH_MISMATCH: Counter = Counter::new();

/// Free bytes across all shards, as of the last report.
#[metric(name = "l2_free_bytes", description = "Free bytes across all shards")]
pub static FREE_BYTES: Gauge = Gauge::new();

/// Configured capacity in bytes.
#[metric(name = "l2_capacity_bytes", description = "Configured capacity in bytes")]
pub static CAPACITY_BYTES: Gauge = Gauge::new();

/// Resident rows, as of the last report.
#[metric(name = "l2_items", description = "Resident rows across all shards")]
pub static ITEMS: Gauge = Gauge::new();

#[cfg(test)]
mod tests {
    #[test]
    fn test_cache_metrics_are_described() {
        let mut seen = 0;
        for metric in metriken::metrics().iter() {
            let name = metric.name();
            if !name.starts_with("l2_") {
                continue;
            }
            seen += 1;
            assert!(
                metric.description().is_some_and(|d| !d.is_empty()),
                "{} has no description",
                name
            );
        }
        assert_eq!(seen, 12);
    }
}
