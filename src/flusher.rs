//! Periodic persistence of in-memory traffic counters, so long-lived
//! forwards keep their durable totals close to reality.

use std::sync::Arc;
use std::time::Duration;

use log::warn;

use crate::PortholeServer;

pub(crate) const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) async fn run(server: Arc<PortholeServer>) {
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    // The immediate first tick has nothing to flush.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        flush_once(&server).await;
    }
}

// Write every live forward's counter snapshot as absolute totals. Failures
// are logged and retried on the next tick.
pub(crate) async fn flush_once(server: &PortholeServer) {
    for (target_id, bytes_up, bytes_down) in server.registry.snapshot_target_traffic().await {
        if let Err(error) = server
            .db
            .update_target_traffic(target_id, bytes_up, bytes_down)
            .await
        {
            warn!("Failed to update traffic stats for target connection {target_id}: {error:#}");
        }
    }
}
