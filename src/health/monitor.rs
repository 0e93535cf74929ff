//! Periodic authority probing.
//!
//! # Responsibilities
//! - Run a probe sweep on every tick
//! - Exit promptly when shutdown is signalled

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::discovery::DiscoveryCache;
use crate::health::prober::FanOutProber;

pub struct HealthMonitor {
    prober: Arc<FanOutProber>,
    cache: Arc<DiscoveryCache>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(prober: Arc<FanOutProber>, cache: Arc<DiscoveryCache>, interval: Duration) -> Self {
        Self {
            prober,
            cache,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Health monitor starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.prober.sweep(&self.cache).await {
                        tracing::warn!(error = %e, "Probe round skipped");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
