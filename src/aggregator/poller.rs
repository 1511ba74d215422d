//! Per-venue polling task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::slot::VenueSlot;
use crate::error::FetchError;
use crate::metrics;
use crate::orderbook::normalize;
use crate::venue::VenueFeed;

/// Fetches one venue on a fixed interval and keeps its slot current.
pub struct VenuePoller {
    feed: Arc<dyn VenueFeed>,
    slot: Arc<VenueSlot>,
    interval: Duration,
    timeout: Duration,
    depth: Option<usize>,
}

impl VenuePoller {
    /// Create a poller writing into `slot`.
    pub fn new(
        feed: Arc<dyn VenueFeed>,
        slot: Arc<VenueSlot>,
        interval: Duration,
        timeout: Duration,
        depth: Option<usize>,
    ) -> Self {
        debug_assert_eq!(feed.venue(), slot.venue());
        Self {
            feed,
            slot,
            interval,
            timeout,
            depth,
        }
    }

    /// Fetch once, bounded by the timeout, and update the slot.
    ///
    /// On failure the slot keeps its previous book and the error is returned
    /// for logging.
    #[instrument(skip(self), fields(venue = %self.slot.venue()))]
    pub async fn poll_once(&self) -> Result<(), FetchError> {
        let venue = self.slot.venue();
        let start = Instant::now();

        let attempt = tokio::time::timeout(self.timeout, self.feed.fetch()).await;
        let finished_at = OffsetDateTime::now_utc();
        metrics::record_venue_fetch_latency(start, venue);

        let result = match attempt {
            Ok(result) => result,
            Err(_elapsed) => Err(FetchError::Timeout {
                venue,
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match result {
            Ok(raw) => {
                let book = normalize(venue, &raw, finished_at, self.depth);
                debug!(
                    bids = book.bids.len(),
                    asks = book.asks.len(),
                    discarded = book.discarded,
                    "Venue book refreshed"
                );
                self.slot.publish_book(book);
                Ok(())
            }
            Err(error) => {
                metrics::inc_venue_fetch_failures(venue, error.kind());
                self.slot.record_failure(finished_at, &error);
                Err(error)
            }
        }
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let venue = self.slot.venue();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(venue = %venue, interval_ms = self.interval.as_millis() as u64, "Venue poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(venue = %venue, error = %e, "Venue fetch failed, keeping last-known book");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(venue = %venue, "Venue poller stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
