//! Benchmark metrics.

use metriken::{AtomicHistogram, Counter, metric};

#[metric(name = "bench_lookups", description = "Total lookups issued by workers")]
pub static LOOKUPS: Counter = Counter::new();

#[metric(name = "bench_hits", description = "Lookups served from the cache")]
pub static HITS: Counter = Counter::new();

#[metric(name = "bench_misses", description = "Lookups fetched from the backing tier")]
pub static MISSES: Counter = Counter::new();

#[metric(name = "bench_puts", description = "Rows written to the cache")]
pub static PUTS: Counter = Counter::new();

#[metric(name = "bench_put_errors", description = "Rejected puts")]
pub static PUT_ERRORS: Counter = Counter::new();

#[metric(
    name = "bench_evictions_forwarded",
    description = "Evicted rows forwarded to the backing tier"
)]
pub static EVICTIONS_FORWARDED: Counter = Counter::new();

// Latency histograms
#[metric(
    name = "bench_get_latency",
    description = "Lookup latency histogram (nanoseconds)"
)]
pub static GET_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

#[metric(
    name = "bench_put_latency",
    description = "Put latency histogram (nanoseconds)"
)]
pub static PUT_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

#[metric(
    name = "bench_drain_latency",
    description = "Drain and forward latency histogram (nanoseconds)"
)]
pub static DRAIN_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);
