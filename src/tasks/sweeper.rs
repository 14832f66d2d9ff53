use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::inventory::SharedInventory;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically demote hosts that have stopped heartbeating. Sleeps first so
/// freshly started workers get a full window to report in.
pub async fn run_sweeper(store: SharedInventory, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                let swept = store.lock().await.sweep_silent();
                if swept > 0 {
                    tracing::info!(hosts = swept, "Silent sweep demoted hosts");
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
