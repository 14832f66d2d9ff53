use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::inventory::SharedInventory;

pub const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically report and reset the assignment counters. Reports first, then
/// sleeps, so the log carries a line per collection period from startup on.
pub async fn run_stats(store: SharedInventory, shutdown: CancellationToken) {
    loop {
        let stats = store.lock().await.take_stats();
        let stamp = chrono::Local::now().format("%a %b %e %H:%M:%S %Y");
        tracing::info!(
            "[{}] Hosts Served: {}  Max/Avail: {}/{}",
            stamp,
            stats.served,
            stats.peak,
            stats.total_cpus
        );
        tokio::select! {
            _ = tokio::time::sleep(STATS_INTERVAL) => {}
            _ = shutdown.cancelled() => break,
        }
    }
}
