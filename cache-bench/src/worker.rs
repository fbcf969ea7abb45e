//! Worker thread for one eviction cycle.

use crate::backing::BackingTier;
use crate::config::WorkloadConfig;
use crate::metrics;

use l2_cache::L2Cache;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::time::Instant;

/// Per-worker inputs for a cycle.
pub struct CycleWork<'a> {
    pub id: usize,
    pub cycle: usize,
    pub lookups: usize,
    pub workload: &'a WorkloadConfig,
    pub cache: &'a L2Cache,
    pub backing: &'a BackingTier,
}

/// Run one worker's share of a cycle.
///
/// Hits may write back an updated row; misses fetch the row from the
/// backing tier and insert it. Any evictions land in the cache's bound
/// capture for the main thread to forward.
pub fn run_cycle(work: CycleWork<'_>) {
    let CycleWork {
        id,
        cycle,
        lookups,
        workload,
        cache,
        backing,
    } = work;

    let keyspace = workload.keyspace as i64;
    let update_percent = workload.update_percent;
    let mut row = Vec::with_capacity(workload.row_bytes());

    // distinct stream per worker per cycle
    let seed = workload.seed ^ ((cycle as u64) << 32) ^ id as u64;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

    for _ in 0..lookups {
        let key = rng.random_range(0..keyspace);

        let start = Instant::now();
        let hit = cache
            .with_row(key, |cached| {
                row.clear();
                row.extend_from_slice(cached);
            })
            .is_some();
        let elapsed_ns = start.elapsed().as_nanos() as u64;

        metrics::LOOKUPS.increment();
        let _ = metrics::GET_LATENCY.increment(elapsed_ns);

        if hit {
            metrics::HITS.increment();
            if rng.random_range(0..100u8) >= update_percent {
                continue;
            }
            // simulated training update
            let idx = rng.random_range(0..row.len());
            row[idx] = row[idx].wrapping_add(1);
        } else {
            metrics::MISSES.increment();
            backing.fetch(key, &mut row);
        }

        let start = Instant::now();
        let result = cache.put(key, &row);
        let elapsed_ns = start.elapsed().as_nanos() as u64;
        let _ = metrics::PUT_LATENCY.increment(elapsed_ns);

        if let Err(e) = result {
            metrics::PUT_ERRORS.increment();
            tracing::debug!(key, error = %e, "Put failed");
        } else {
            metrics::PUTS.increment();
        }
    }
}
