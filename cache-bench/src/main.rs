//! Eviction cycle benchmark. Drives an `L2Cache` through repeated capture
//! cycles the way a training loop would, with a simulated backing tier
//! absorbing every evicted row.

mod backing;
mod config;
mod logging;
mod metrics;
mod worker;

use crate::backing::BackingTier;
use crate::config::Config;
use crate::worker::CycleWork;

use clap::Parser;
use l2_cache::L2Cache;
use l2_cache::admin::{self, AdminConfig};
use metriken::{AtomicHistogram, histogram::Histogram};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "l2-cache-bench")]
#[command(about = "Eviction cycle benchmark for the L2 row cache")]
struct Args {
    /// Path to configuration file
    config: PathBuf,
}

fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.logging);

    if let Err(e) = run(config) {
        tracing::error!(error = %e, "Benchmark failed");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    print_config(&config);

    let cache = Arc::new(L2Cache::from_config(&config.cache)?);
    let reporter = admin::start(
        Arc::clone(&cache),
        AdminConfig {
            interval: config.cache.report_interval,
        },
    )?;
    let backing = BackingTier::new(config.workload.row_bytes());

    cache.begin_cycle(
        config.max_evictions(),
        config.workload.row_width,
        config.workload.element,
    )?;

    // Signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let start = Instant::now();
    let mut completed = 0;
    let mut last_hits = 0u64;
    let mut last_misses = 0u64;

    print_header();

    for cycle in 0..config.general.cycles {
        if !running.load(Ordering::SeqCst) {
            tracing::info!(cycle, "Interrupted, stopping");
            break;
        }

        let cycle_start = Instant::now();

        thread::scope(|s| -> std::io::Result<()> {
            for id in 0..config.general.threads {
                let work = CycleWork {
                    id,
                    cycle,
                    lookups: config.general.lookups_per_cycle,
                    workload: &config.workload,
                    cache: cache.as_ref(),
                    backing: &backing,
                };
                thread::Builder::new()
                    .name(format!("worker-{id}"))
                    .spawn_scoped(s, move || worker::run_cycle(work))?;
            }
            Ok(())
        })?;

        let lookup_time = cycle_start.elapsed();

        // Workers have joined; forward this cycle's evictions and rewind.
        let drain_start = Instant::now();
        let evicted = cache.drain().ok_or("eviction cycle is not bound")?;
        let forwarded = backing.absorb(&evicted);
        cache.reset_cycle();
        let _ = metrics::DRAIN_LATENCY.increment(drain_start.elapsed().as_nanos() as u64);
        metrics::EVICTIONS_FORWARDED.add(forwarded as u64);

        let hits = metrics::HITS.value();
        let misses = metrics::MISSES.value();
        let delta_hits = hits - last_hits;
        let delta_gets = delta_hits + (misses - last_misses);
        let hit_pct = if delta_gets > 0 {
            (delta_hits as f64 / delta_gets as f64) * 100.0
        } else {
            0.0
        };
        last_hits = hits;
        last_misses = misses;

        let usage = cache.usage();
        println!(
            "{:>8} {:>10.1} {:>7.1}% {:>10} {:>9.1}%",
            cycle,
            lookup_time.as_secs_f64() * 1000.0,
            hit_pct,
            forwarded,
            usage.utilization() * 100.0,
        );

        tracing::debug!(cycle, forwarded, backing_rows = backing.len(), "Cycle complete");
        completed += 1;
    }

    if let Some(leftover) = cache.end_cycle()
        && !leftover.is_empty()
    {
        let forwarded = backing.absorb(&leftover);
        metrics::EVICTIONS_FORWARDED.add(forwarded as u64);
    }

    admin::report_usage(&cache);
    reporter.shutdown();

    print_summary(completed, start.elapsed().as_secs_f64(), &backing);

    Ok(())
}

fn print_config(config: &Config) {
    eprintln!("l2-cache-bench configuration:");
    eprintln!("  capacity:   {} bytes", config.cache.capacity);
    eprintln!("  shards:     {}", config.cache.shards);
    eprintln!("  cycles:     {}", config.general.cycles);
    eprintln!("  threads:    {}", config.general.threads);
    eprintln!("  lookups:    {} per thread per cycle", config.general.lookups_per_cycle);
    eprintln!(
        "  rows:       {} x {} ({} bytes)",
        config.workload.row_width,
        config.workload.element,
        config.workload.row_bytes(),
    );
    eprintln!("  keyspace:   {} rows", config.workload.keyspace);
    eprintln!("  updates:    {}% of hits", config.workload.update_percent);
    eprintln!("  capture:    {} rows per cycle", config.max_evictions());
    eprintln!();
}

fn print_header() {
    println!(
        "{:>8} {:>10} {:>8} {:>10} {:>10}",
        "cycle", "time(ms)", "hit%", "evicted", "util",
    );
    println!("{}", "-".repeat(50));
}

fn print_summary(cycles: usize, elapsed: f64, backing: &BackingTier) {
    let lookups = metrics::LOOKUPS.value();
    let hits = metrics::HITS.value();
    let misses = metrics::MISSES.value();
    let puts = metrics::PUTS.value();
    let put_errors = metrics::PUT_ERRORS.value();
    let forwarded = metrics::EVICTIONS_FORWARDED.value();

    let total_gets = hits + misses;
    let hit_pct = if total_gets > 0 {
        (hits as f64 / total_gets as f64) * 100.0
    } else {
        0.0
    };
    let rate = if elapsed > 0.0 {
        lookups as f64 / elapsed
    } else {
        0.0
    };

    eprintln!();
    eprintln!("=== Final Summary ===");
    eprintln!("  cycles:       {cycles}");
    eprintln!("  lookups:      {lookups}");
    eprintln!("  lookups/sec:  {rate:.0}");
    eprintln!("  hit rate:     {hit_pct:.1}%");
    eprintln!("  puts:         {puts} (errors: {put_errors})");
    eprintln!("  forwarded:    {forwarded} evicted rows");
    eprintln!("  backing rows: {}", backing.len());
    eprintln!();

    print_latency_summary("GET", &metrics::GET_LATENCY);
    print_latency_summary("PUT", &metrics::PUT_LATENCY);
    print_latency_summary("DRAIN", &metrics::DRAIN_LATENCY);
}

fn print_latency_summary(label: &str, hist: &AtomicHistogram) {
    let p50 = percentile(hist, 50.0) / 1000.0;
    let p90 = percentile(hist, 90.0) / 1000.0;
    let p99 = percentile(hist, 99.0) / 1000.0;
    let p999 = percentile(hist, 99.9) / 1000.0;
    let max = percentile(hist, 100.0) / 1000.0;

    eprintln!(
        "  {label:<6} latency (us): p50={p50:.1}  p90={p90:.1}  p99={p99:.1}  p999={p999:.1}  max={max:.1}",
    );
}

// --- Histogram helpers ---

fn percentile(hist: &AtomicHistogram, p: f64) -> f64 {
    if let Some(snapshot) = hist.load() {
        percentile_from_histogram(&snapshot, p)
    } else {
        0.0
    }
}

fn percentile_from_histogram(hist: &Histogram, p: f64) -> f64 {
    if let Ok(Some(results)) = hist.percentiles(&[p])
        && let Some((_pct, bucket)) = results.first()
    {
        return bucket.end() as f64;
    }
    0.0
}
