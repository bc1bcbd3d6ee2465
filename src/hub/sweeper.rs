//! Liveness sweeper — evicts connections that have gone silent.

use std::sync::Arc;

use tracing::{debug, info};

use super::Hub;

impl Hub {
    /// Close and remove every connection silent for longer than `stale_after`.
    ///
    /// Evicted workers are marked offline and broadcast through the normal
    /// disconnect path, so a connection is never swept twice. Returns the
    /// number of connections evicted by this pass.
    pub async fn sweep(&self) -> usize {
        let stale = self.registry.stale(self.config.stale_after).await;
        let mut evicted = 0;

        for conn_id in stale {
            // Already removed by its own disconnect handler.
            let Some(record) = self.registry.get(conn_id).await else {
                continue;
            };
            record.handle.close();
            let went_offline = self.disconnect(conn_id).await;
            evicted += 1;
            debug!(
                conn_id = %conn_id,
                worker_id = went_offline.as_ref().map(|s| s.id.as_str()).unwrap_or("-"),
                "Evicted silent connection"
            );
        }

        if evicted > 0 {
            info!(count = evicted, "Swept stale connections");
        }
        evicted
    }
}

/// Spawn a background task that sweeps on `sweep_interval`.
pub fn spawn_sweeper(hub: Arc<Hub>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(hub.config().sweep_interval);
        // The first tick completes immediately; nothing can be stale yet.
        interval.tick().await;
        loop {
            interval.tick().await;
            hub.sweep().await;
        }
    })
}
