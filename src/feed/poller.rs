//! Feed Poller
//!
//! Periodically fetches order books and publishes them to the hub, one topic
//! per instrument.

use super::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::config::FeedConfig;
use crate::websocket::ConnectionHub;

/// Polls an order book source and broadcasts each snapshot
pub struct FeedPoller {
    source: Arc<dyn OrderBookSource>,
    hub: Arc<ConnectionHub>,
    instruments: Vec<String>,
    interval: Duration,
}

impl FeedPoller {
    pub fn new(
        source: Arc<dyn OrderBookSource>,
        hub: Arc<ConnectionHub>,
        instruments: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            hub,
            instruments,
            interval,
        }
    }

    /// Create a poller using the instruments and interval from config
    pub fn from_config(
        source: Arc<dyn OrderBookSource>,
        hub: Arc<ConnectionHub>,
        config: &FeedConfig,
    ) -> Self {
        Self::new(
            source,
            hub,
            config.instruments.clone(),
            Duration::from_millis(config.poll_interval_ms.max(1)),
        )
    }

    /// Fetch and publish every instrument that has subscribers
    ///
    /// Returns the number of snapshots published. Fetch errors are logged and
    /// do not stop the remaining instruments.
    pub async fn poll_once(&self) -> usize {
        let mut published = 0;

        for instrument in &self.instruments {
            if self.hub.subscriber_count(instrument).await == 0 {
                continue;
            }

            let snapshot = match self.source.fetch(instrument).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(
                        source = self.source.name(),
                        instrument = %instrument,
                        error = %e,
                        "Order book fetch failed"
                    );
                    continue;
                }
            };

            let payload = match snapshot.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(instrument = %instrument, error = %e, "Failed to encode order book");
                    continue;
                }
            };

            let report = self.hub.publish(instrument, payload).await;
            tracing::debug!(
                instrument = %instrument,
                delivered = report.delivered,
                "Published order book"
            );
            published += 1;
        }

        published
    }

    /// Start the polling loop; it exits when the hub shuts down
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                source = self.source.name(),
                instruments = ?self.instruments,
                interval_ms = self.interval.as_millis() as u64,
                "Feed poller started"
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.poll_once().await;
                    }
                    _ = self.hub.closing() => break,
                }
            }

            tracing::info!("Feed poller stopped");
        })
    }
}
