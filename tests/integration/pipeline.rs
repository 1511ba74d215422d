//! Mock-feed pipeline tests: fetch, normalize, merge, price, publish, serve.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

use book_aggregator::aggregator::{
    spawn_aggregator, CycleReport, CycleSettings, Freshness, ReportReceiver,
};
use book_aggregator::api::{create_router, AppState};
use book_aggregator::orderbook::ExecutionOutcome;
use book_aggregator::venue::{MockVenueFeed, RawSnapshot, VenueFeed, VenueId};

const COINBASE_BOOK: &str = r#"{
    "bids": [["99.50", "1.0", 3], ["99.00", "2.0", 1]],
    "asks": [["100.00", "2.0", 4], ["101.00", "3.0", 2]],
    "sequence": 123456,
    "auction_mode": false
}"#;

const GEMINI_BOOK: &str = r#"{
    "bids": [
        {"price": "99.20", "amount": "1.5", "timestamp": "1700000000"},
        {"price": "-1", "amount": "4", "timestamp": "1700000000"}
    ],
    "asks": [
        {"price": "102.00", "amount": "5", "timestamp": "1700000000"},
        {"price": "100.50", "amount": "1", "timestamp": "1700000000"},
        {"price": "abc", "amount": "1", "timestamp": "1700000000"}
    ]
}"#;

fn settings(quantity: rust_decimal::Decimal) -> CycleSettings {
    CycleSettings {
        quantity,
        poll_interval: Duration::from_secs(2),
        fetch_timeout: Duration::from_millis(1500),
        max_staleness: Duration::from_secs(30),
    }
}

fn feeds() -> (MockVenueFeed, MockVenueFeed) {
    let coinbase = MockVenueFeed::new(VenueId::Coinbase);
    coinbase.set_snapshot(serde_json::from_str::<RawSnapshot>(COINBASE_BOOK).unwrap());
    let gemini = MockVenueFeed::new(VenueId::Gemini);
    gemini.set_snapshot(serde_json::from_str::<RawSnapshot>(GEMINI_BOOK).unwrap());
    (coinbase, gemini)
}

fn as_feeds(coinbase: &MockVenueFeed, gemini: &MockVenueFeed) -> [Arc<dyn VenueFeed>; 2] {
    [Arc::new(coinbase.clone()), Arc::new(gemini.clone())]
}

/// Wait (in paused time) for a published report matching `predicate`.
async fn wait_for_report(
    reports: &mut ReportReceiver,
    predicate: impl Fn(&CycleReport) -> bool,
) -> Arc<CycleReport> {
    let found = tokio::time::timeout(
        Duration::from_secs(20),
        reports.wait_for(|r| r.as_deref().is_some_and(&predicate)),
    )
    .await
    .expect("no matching report within 20s")
    .expect("aggregator stopped");

    found.clone().unwrap()
}

#[tokio::test(start_paused = true)]
async fn venue_payloads_flow_into_priced_report() {
    let (coinbase, gemini) = feeds();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_aggregator(
        as_feeds(&coinbase, &gemini),
        settings(dec!(4)),
        None,
        dec!(0.01),
        shutdown_rx,
    );
    let mut reports = handle.reports.clone();

    let report = wait_for_report(&mut reports, |r| !r.is_degraded()).await;

    let asks: Vec<_> = report
        .book
        .asks()
        .iter()
        .map(|l| (l.price(), l.venue()))
        .collect();
    assert_eq!(
        asks,
        vec![
            (dec!(100), VenueId::Coinbase),
            (dec!(100.5), VenueId::Gemini),
            (dec!(101), VenueId::Coinbase),
            (dec!(102), VenueId::Gemini),
        ]
    );
    assert_eq!(report.buy.outcome(), ExecutionOutcome::Filled);
    assert_eq!(report.buy.notional, dec!(401.5));
    assert_eq!(report.buy.average_price, Some(dec!(100.375)));
    assert_eq!(report.sell.notional, dec!(396.8));
    assert_eq!(report.venue(VenueId::Gemini).unwrap().discarded_levels, 2);
    assert_eq!(report.venue(VenueId::Coinbase).unwrap().discarded_levels, 0);

    shutdown_tx.send(true).unwrap();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn failing_venue_is_served_stale() {
    let (coinbase, gemini) = feeds();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_aggregator(
        as_feeds(&coinbase, &gemini),
        settings(dec!(4)),
        None,
        dec!(0.01),
        shutdown_rx,
    );
    let mut reports = handle.reports.clone();
    wait_for_report(&mut reports, |r| !r.is_degraded()).await;

    gemini.set_fail_status(Some(502));
    let report = wait_for_report(&mut reports, |r| {
        r.venue(VenueId::Gemini).unwrap().freshness == Freshness::Stale
    })
    .await;

    let status = report.venue(VenueId::Gemini).unwrap();
    assert!(status.consecutive_failures >= 1);
    assert_eq!(status.last_error.as_deref(), Some("gemini returned HTTP 502"));
    assert_eq!(status.ask_levels, 2);
    assert_eq!(report.stale_venues(), vec![VenueId::Gemini]);
    assert_eq!(report.buy.filled_by_venue(VenueId::Gemini), dec!(1));

    gemini.set_fail_status(None);
    wait_for_report(&mut reports, |r| !r.is_degraded()).await;

    shutdown_tx.send(true).unwrap();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn slow_venue_times_out_without_blocking_cycles() {
    let (coinbase, gemini) = feeds();
    coinbase.set_latency_ms(10_000);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_aggregator(
        as_feeds(&coinbase, &gemini),
        settings(dec!(20)),
        None,
        dec!(0.01),
        shutdown_rx,
    );
    let mut reports = handle.reports.clone();

    let report = wait_for_report(&mut reports, |r| r.buy.filled_quantity > dec!(0)).await;

    let coinbase_status = report.venue(VenueId::Coinbase).unwrap();
    assert_eq!(coinbase_status.freshness, Freshness::Missing);
    assert_eq!(report.buy.outcome(), ExecutionOutcome::Partial);
    assert_eq!(report.buy.filled_quantity, dec!(6));
    assert!(!report.buy.fully_filled);

    shutdown_tx.send(true).unwrap();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn api_serves_latest_cycle() {
    let (coinbase, gemini) = feeds();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_aggregator(
        as_feeds(&coinbase, &gemini),
        settings(dec!(10)),
        Some(1),
        dec!(0.01),
        shutdown_rx,
    );
    let state = AppState::new(handle.reports.clone(), dec!(0.01));
    let mut reports = handle.reports.clone();
    wait_for_report(&mut reports, |r| !r.is_degraded()).await;

    let ready = create_router(state.clone())
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri("/api/v1/execution")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    // Depth 1 keeps 100 (Coinbase) and 100.5 (Gemini): 3 BTC on the ask side.
    assert_eq!(body["buy"]["outcome"], "partial");
    let filled: rust_decimal::Decimal = body["buy"]["filled_quantity"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(filled, dec!(3));
    assert_eq!(body["buy"]["average_price_rounded"], "100.17");

    shutdown_tx.send(true).unwrap();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn no_report_while_every_venue_fails() {
    let (coinbase, gemini) = feeds();
    coinbase.set_fail_malformed(true);
    gemini.set_fail_status(Some(503));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_aggregator(
        as_feeds(&coinbase, &gemini),
        settings(dec!(1)),
        None,
        dec!(0.01),
        shutdown_rx,
    );

    tokio::time::sleep(Duration::from_secs(7)).await;

    assert!(handle.reports.borrow().is_none());
    assert!(coinbase.calls() >= 3);
    let state = handle.slots[1].snapshot();
    assert!(state.book.is_none());
    assert!(state.consecutive_failures >= 3);

    shutdown_tx.send(true).unwrap();
    handle.join().await;
}
