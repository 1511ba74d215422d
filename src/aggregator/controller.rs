//! Interval-driven aggregation cycle.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::poller::VenuePoller;
use super::report::{CycleReport, Freshness, VenueStatus};
use super::slot::VenueSlot;
use crate::config::Config;
use crate::error::CycleError;
use crate::metrics;
use crate::orderbook::{execution_price, merge, Side, VenueBook};
use crate::utils::round_to_increment;
use crate::venue::{VenueFeed, VenueId};

/// Receiver for the most recently published cycle.
pub type ReportReceiver = watch::Receiver<Option<Arc<CycleReport>>>;

/// Timing and sizing for the cycle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSettings {
    /// Quantity priced on each side.
    pub quantity: Decimal,
    /// Time between cycles and between fetches.
    pub poll_interval: Duration,
    /// Upper bound on a single venue fetch.
    pub fetch_timeout: Duration,
    /// Age after which a venue's book is left out of the merge.
    pub max_staleness: Duration,
}

impl CycleSettings {
    /// Age up to which a successfully fetched book counts as fresh.
    pub fn fresh_window(&self) -> Duration {
        self.poll_interval + self.fetch_timeout
    }
}

impl From<&Config> for CycleSettings {
    fn from(config: &Config) -> Self {
        Self {
            quantity: config.target_quantity,
            poll_interval: config.poll_interval(),
            fetch_timeout: config.fetch_timeout(),
            max_staleness: config.max_staleness(),
        }
    }
}

/// Reads both venue slots, merges, prices, and publishes a [`CycleReport`].
pub struct CycleController {
    slots: [Arc<VenueSlot>; 2],
    settings: CycleSettings,
    sequence: u64,
    publisher: watch::Sender<Option<Arc<CycleReport>>>,
}

impl CycleController {
    /// Create a controller over one slot per venue.
    pub fn new(slots: [Arc<VenueSlot>; 2], settings: CycleSettings) -> Self {
        let (publisher, _rx) = watch::channel(None);
        Self {
            slots,
            settings,
            sequence: 0,
            publisher,
        }
    }

    /// Receiver for published reports.
    pub fn subscribe(&self) -> ReportReceiver {
        self.publisher.subscribe()
    }

    /// Run one cycle at the current wall-clock time.
    pub fn run_cycle(&mut self) -> Result<Arc<CycleReport>, CycleError> {
        self.run_cycle_at(OffsetDateTime::now_utc())
    }

    /// Run one cycle as of `now`.
    ///
    /// Never waits on a venue. Stale books are reused until they pass the
    /// staleness ceiling; when neither venue has a usable book the cycle
    /// fails and the previously published report stays in place.
    #[instrument(level = "debug", skip(self), fields(sequence = self.sequence + 1))]
    pub fn run_cycle_at(&mut self, now: OffsetDateTime) -> Result<Arc<CycleReport>, CycleError> {
        let _timer = metrics::timer_cycle();

        let mut statuses = Vec::with_capacity(self.slots.len());
        let mut books = Vec::with_capacity(self.slots.len());

        for slot in &self.slots {
            let venue = slot.venue();
            let state = slot.snapshot();
            let freshness = Freshness::classify(
                &state,
                now,
                self.settings.fresh_window(),
                self.settings.max_staleness,
            );
            let status = VenueStatus::from_state(venue, &state, freshness, now);

            match freshness {
                Freshness::Fresh => {}
                Freshness::Stale => {
                    metrics::inc_stale_venue_cycles(venue);
                    warn!(
                        venue = %venue,
                        age_ms = status.age_ms,
                        failures = status.consecutive_failures,
                        "Reusing last-known book"
                    );
                }
                Freshness::Expired => {
                    warn!(venue = %venue, age_ms = status.age_ms, "Venue book expired, excluded from merge");
                }
                Freshness::Missing => {
                    debug!(venue = %venue, "No book received yet");
                }
            }

            let book = match (&state.book, freshness.is_usable()) {
                (Some(book), true) => Arc::clone(book),
                _ => Arc::new(VenueBook::empty(venue, now)),
            };
            books.push(book);
            statuses.push(status);
        }

        if !statuses.iter().any(|s| s.freshness.is_usable()) {
            metrics::inc_cycles_failed();
            let error = CycleError::BothVenuesStale {
                never_seen: venues_with(&statuses, Freshness::Missing),
                expired: venues_with(&statuses, Freshness::Expired),
            };
            warn!(error = %error, "Cycle skipped");
            return Err(error);
        }

        let book = merge(&books[0], &books[1]);
        let quantity = self.settings.quantity;
        let (buy, sell) = match (
            execution_price(&book, Side::Buy, quantity),
            execution_price(&book, Side::Sell, quantity),
        ) {
            (Ok(buy), Ok(sell)) => (buy, sell),
            (Err(e), _) | (_, Err(e)) => {
                metrics::inc_cycles_failed();
                warn!(error = %e, "Cycle skipped");
                return Err(e.into());
            }
        };

        self.sequence += 1;
        let report = Arc::new(CycleReport {
            sequence: self.sequence,
            produced_at: now,
            quantity,
            book,
            buy,
            sell,
            venues: statuses,
        });

        self.publisher.send_replace(Some(Arc::clone(&report)));
        metrics::inc_cycles_published();

        Ok(report)
    }

    /// Run a cycle on every tick until `shutdown` flips to true.
    ///
    /// The first cycle runs one poll interval after start, once the pollers
    /// have had a chance to fill their slots.
    pub async fn run(mut self, increment: Decimal, mut shutdown: watch::Receiver<bool>) {
        let period = self.settings.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            quantity = %self.settings.quantity,
            interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Cycle loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Ok(report) = self.run_cycle() {
                        log_report(&report, increment);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(cycles = self.sequence, "Cycle loop stopped");
    }
}

fn venues_with(statuses: &[VenueStatus], freshness: Freshness) -> Vec<VenueId> {
    statuses
        .iter()
        .filter(|s| s.freshness == freshness)
        .map(|s| s.venue)
        .collect()
}

/// One structured line per published cycle.
fn log_report(report: &CycleReport, increment: Decimal) {
    let rounded = |p: Option<Decimal>| p.map(|p| round_to_increment(p, increment).to_string());

    info!(
        sequence = report.sequence,
        quantity = %report.quantity,
        best_bid = ?report.best_bid().map(|l| l.price()),
        best_ask = ?report.best_ask().map(|l| l.price()),
        buy_avg = ?rounded(report.buy.average_price),
        buy_outcome = %report.buy.outcome(),
        sell_avg = ?rounded(report.sell.average_price),
        sell_outcome = %report.sell.outcome(),
        stale = ?report.stale_venues(),
        excluded = ?report.excluded_venues(),
        "Cycle published"
    );
}

/// Running pollers and cycle loop.
pub struct AggregatorHandle {
    /// Latest published report.
    pub reports: ReportReceiver,
    /// Slot per venue, in canonical order.
    pub slots: [Arc<VenueSlot>; 2],
    /// Poller and controller tasks.
    pub tasks: Vec<JoinHandle<()>>,
}

impl AggregatorHandle {
    /// Wait for every task to finish after shutdown.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Aggregator task ended abnormally");
            }
        }
    }
}

/// Spawn one poller per feed and the cycle loop.
///
/// `feeds` must hold one feed per venue in [`VenueId::ALL`] order.
pub fn spawn_aggregator(
    feeds: [Arc<dyn VenueFeed>; 2],
    settings: CycleSettings,
    depth: Option<usize>,
    increment: Decimal,
    shutdown: watch::Receiver<bool>,
) -> AggregatorHandle {
    let slots = feeds
        .each_ref()
        .map(|feed| Arc::new(VenueSlot::new(feed.venue())));

    let mut tasks = Vec::with_capacity(3);
    for (feed, slot) in feeds.into_iter().zip(slots.iter()) {
        let poller = VenuePoller::new(
            feed,
            Arc::clone(slot),
            settings.poll_interval,
            settings.fetch_timeout,
            depth,
        );
        tasks.push(poller.spawn(shutdown.clone()));
    }

    let controller = CycleController::new(slots.clone(), settings);
    let reports = controller.subscribe();
    tasks.push(tokio::spawn(controller.run(increment, shutdown)));

    AggregatorHandle {
        reports,
        slots,
        tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionError, FetchError};
    use crate::orderbook::{normalize, ExecutionOutcome};
    use crate::venue::{MockVenueFeed, RawSnapshot};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-01-01 00:00:00 UTC);

    fn settings() -> CycleSettings {
        CycleSettings {
            quantity: dec!(4),
            poll_interval: Duration::from_secs(2),
            fetch_timeout: Duration::from_millis(1500),
            max_staleness: Duration::from_secs(30),
        }
    }

    fn controller() -> CycleController {
        let slots = VenueId::ALL.map(|venue| Arc::new(VenueSlot::new(venue)));
        CycleController::new(slots, settings())
    }

    fn publish(
        controller: &CycleController,
        index: usize,
        asks: &[(Decimal, Decimal)],
        at: OffsetDateTime,
    ) {
        let slot = &controller.slots[index];
        let raw = RawSnapshot::from_pairs(&[(dec!(99), dec!(1))], asks);
        slot.publish_book(normalize(slot.venue(), &raw, at, None));
    }

    fn fail(controller: &CycleController, index: usize, at: OffsetDateTime) {
        let slot = &controller.slots[index];
        slot.record_failure(
            at,
            &FetchError::Timeout {
                venue: slot.venue(),
                timeout_ms: 1500,
            },
        );
    }

    fn secs(s: i64) -> time::Duration {
        time::Duration::seconds(s)
    }

    #[test]
    fn both_fresh_merges_and_prices() {
        let mut controller = controller();
        publish(&controller, 0, &[(dec!(100), dec!(2)), (dec!(101), dec!(3))], T0);
        publish(&controller, 1, &[(dec!(100.5), dec!(1)), (dec!(102), dec!(5))], T0);

        let report = controller.run_cycle_at(T0 + secs(1)).unwrap();

        assert_eq!(report.sequence, 1);
        assert_eq!(report.buy.filled_quantity, dec!(4));
        assert_eq!(report.buy.notional, dec!(401.5));
        assert_eq!(report.buy.average_price, Some(dec!(100.375)));
        assert_eq!(report.sell.outcome(), ExecutionOutcome::Partial);
        assert!(!report.is_degraded());
        assert_eq!(report.book.asks().len(), 4);
    }

    #[test]
    fn failed_venue_is_reused_as_stale() {
        let mut controller = controller();
        publish(&controller, 0, &[(dec!(100), dec!(2))], T0);
        publish(&controller, 1, &[(dec!(100.5), dec!(5))], T0);
        fail(&controller, 1, T0 + secs(2));

        let report = controller.run_cycle_at(T0 + secs(3)).unwrap();

        assert_eq!(report.stale_venues(), vec![VenueId::Gemini]);
        let gemini = report.venue(VenueId::Gemini).unwrap();
        assert_eq!(gemini.consecutive_failures, 1);
        assert_eq!(gemini.age_ms, Some(3_000));
        assert_eq!(gemini.last_attempt_at, Some(T0 + secs(2)));
        assert_eq!(gemini.ask_levels, 1);
        assert!(gemini.last_error.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.buy.filled_by_venue(VenueId::Gemini), dec!(2));
    }

    #[test]
    fn missing_venue_is_excluded() {
        let mut controller = controller();
        publish(&controller, 1, &[(dec!(100.5), dec!(5))], T0);

        let report = controller.run_cycle_at(T0).unwrap();

        assert_eq!(report.excluded_venues(), vec![VenueId::Coinbase]);
        assert_eq!(
            report.venue(VenueId::Coinbase).unwrap().freshness,
            Freshness::Missing
        );
        assert!(report.buy.fully_filled);
    }

    #[test]
    fn no_books_fails_cycle() {
        let mut controller = controller();
        let mut rx = controller.subscribe();

        let err = controller.run_cycle_at(T0).unwrap_err();

        assert_eq!(
            err,
            CycleError::BothVenuesStale {
                never_seen: vec![VenueId::Coinbase, VenueId::Gemini],
                expired: vec![],
            }
        );
        assert!(!rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }

    #[test]
    fn books_past_ceiling_fail_cycle_and_keep_last_report() {
        let mut controller = controller();
        publish(&controller, 0, &[(dec!(100), dec!(2))], T0);
        publish(&controller, 1, &[(dec!(100.5), dec!(5))], T0);
        let first = controller.run_cycle_at(T0).unwrap();

        let err = controller.run_cycle_at(T0 + secs(31)).unwrap_err();

        assert_eq!(
            err,
            CycleError::BothVenuesStale {
                never_seen: vec![],
                expired: vec![VenueId::Coinbase, VenueId::Gemini],
            }
        );
        let published = controller.subscribe().borrow().clone().unwrap();
        assert_eq!(published.sequence, first.sequence);
    }

    #[test]
    fn overflowing_notional_fails_cycle_instead_of_panicking() {
        let mut controller = controller();
        let near_max = Decimal::MAX - dec!(1);
        publish(&controller, 0, &[(near_max, dec!(1))], T0);
        publish(&controller, 1, &[(near_max, dec!(1))], T0);

        let err = controller.run_cycle_at(T0).unwrap_err();

        assert!(matches!(
            err,
            CycleError::Execution(ExecutionError::NotionalOverflow { side: Side::Buy, .. })
        ));
        assert!(controller.subscribe().borrow().is_none());
    }

    #[test]
    fn one_expired_venue_does_not_fail_cycle() {
        let mut controller = controller();
        publish(&controller, 0, &[(dec!(100), dec!(2))], T0);
        publish(&controller, 1, &[(dec!(100.5), dec!(5))], T0 + secs(40));

        let report = controller.run_cycle_at(T0 + secs(41)).unwrap();

        assert_eq!(report.excluded_venues(), vec![VenueId::Coinbase]);
        assert_eq!(report.buy.filled_by_venue(VenueId::Coinbase), dec!(0));
        assert_eq!(report.buy.average_price, Some(dec!(100.5)));
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_waits_one_interval() {
        let controller = controller();
        publish(&controller, 0, &[(dec!(100), dec!(2))], OffsetDateTime::now_utc());
        let reports = controller.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(controller.run(dec!(0.01), shutdown_rx));

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(reports.borrow().is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let report = reports.borrow().clone().unwrap();
        assert_eq!(report.sequence, 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_aggregator_publishes() {
        let coinbase = MockVenueFeed::with_levels(
            VenueId::Coinbase,
            &[(dec!(99), dec!(1))],
            &[(dec!(100), dec!(2)), (dec!(101), dec!(3))],
        );
        let gemini = MockVenueFeed::with_levels(
            VenueId::Gemini,
            &[(dec!(98), dec!(1))],
            &[(dec!(100.5), dec!(1)), (dec!(102), dec!(5))],
        );
        let feeds: [Arc<dyn VenueFeed>; 2] = [Arc::new(coinbase), Arc::new(gemini)];
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_aggregator(
            feeds,
            settings(),
            None,
            dec!(0.01),
            shutdown_rx,
        );
        let mut reports = handle.reports.clone();

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        reports.changed().await.unwrap();
        let report = reports.borrow_and_update().clone().unwrap();
        assert_eq!(report.buy.average_price, Some(dec!(100.375)));

        shutdown_tx.send(true).unwrap();
        handle.join().await;
    }
}
