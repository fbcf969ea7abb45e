//! Background usage reporting.
//!
//! The reporter runs on its own thread with a single-threaded Tokio runtime
//! so it never competes with the threads issuing lookups. Every interval it
//! publishes the usage gauges and logs a summary.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use crate::L2Cache;
use crate::metrics::{CAPACITY_BYTES, CAPTURE_OVERFLOW, FREE_BYTES, ITEMS, PUT_EX};

/// Handle returned by [`start`] for shutdown coordination.
pub struct AdminHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: std::thread::JoinHandle<()>,
}

impl AdminHandle {
    /// Signal the reporter to stop and wait for it to finish.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join_handle.join();
    }
}

/// Configuration for the reporter.
#[derive(Debug, Clone, Copy)]
pub struct AdminConfig {
    /// Time between reports.
    pub interval: Duration,
}

/// Start the usage reporter in a dedicated thread.
pub fn start(cache: Arc<L2Cache>, config: AdminConfig) -> std::io::Result<AdminHandle> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let join_handle = std::thread::Builder::new()
        .name("l2-admin".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create admin runtime");
                    return;
                }
            };

            rt.block_on(run_reporter(cache, config.interval, shutdown_rx));
        })?;

    Ok(AdminHandle {
        shutdown_tx,
        join_handle,
    })
}

async fn run_reporter(
    cache: Arc<L2Cache>,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_overflows = CAPTURE_OVERFLOW.value();
    let mut last_put_ex = PUT_EX.value();

    tracing::debug!(interval = ?interval, "Usage reporter started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                report_usage(&cache);

                let overflows = CAPTURE_OVERFLOW.value();
                if overflows > last_overflows {
                    tracing::warn!(
                        overflows = overflows - last_overflows,
                        "Eviction capture overflowed; cycle buffers are undersized"
                    );
                }
                last_overflows = overflows;

                let put_ex = PUT_EX.value();
                if put_ex > last_put_ex {
                    tracing::warn!(failed = put_ex - last_put_ex, "Puts rejected since last report");
                }
                last_put_ex = put_ex;
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("Usage reporter received shutdown signal");
                break;
            }
        }
    }

    tracing::debug!("Usage reporter stopped");
}

/// Publish the cache usage gauges and log a usage summary.
pub fn report_usage(cache: &L2Cache) {
    let usage = cache.usage();
    let items = cache.len();

    FREE_BYTES.set(usage.free_bytes as i64);
    CAPACITY_BYTES.set(usage.capacity_bytes as i64);
    ITEMS.set(items as i64);

    tracing::debug!(
        free_bytes = usage.free_bytes,
        capacity_bytes = usage.capacity_bytes,
        items,
        utilization = format!("{:.1}%", usage.utilization() * 100.0),
        "Cache usage"
    );
}
