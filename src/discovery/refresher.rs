//! Background refresh keeping the discovery snapshot warm.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time;

use crate::discovery::DiscoveryCache;

pub struct DiscoveryRefresher {
    cache: Arc<DiscoveryCache>,
}

impl DiscoveryRefresher {
    pub fn new(cache: Arc<DiscoveryCache>) -> Self {
        Self { cache }
    }

    /// Tick once per TTL and refresh only when the snapshot has gone stale,
    /// so foreground lookups keep hitting the cache.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let period = self.cache.ttl();
        tracing::info!(ttl_secs = period.as_secs(), "Discovery refresher starting");

        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.cache.is_fresh() {
                        if let Err(e) = self.cache.get().await {
                            tracing::warn!(error = %e, "Background discovery refresh failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Discovery refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
