//! Live venue tests.
//!
//! These hit the public Coinbase and Gemini REST endpoints.
//! Run with: cargo test --test integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use book_aggregator::aggregator::{CycleController, CycleSettings, VenuePoller, VenueSlot};
use book_aggregator::config::Config;
use book_aggregator::orderbook::{normalize, BookSide};
use book_aggregator::venue::{build_http_client, HttpVenueClient, VenueFeed, VenueId};
use time::OffsetDateTime;

/// Get a test config from environment.
fn test_config() -> Config {
    dotenvy::dotenv().ok();
    Config::load().unwrap_or_default()
}

/// Test that Coinbase returns a usable level-2 book.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_coinbase_book() {
    let config = test_config();
    let http = build_http_client(&config).unwrap();
    let client = HttpVenueClient::coinbase(&config, http).unwrap();

    let raw = client.fetch().await;
    assert!(raw.is_ok(), "Failed to fetch Coinbase book: {:?}", raw.err());

    let book = normalize(VenueId::Coinbase, &raw.unwrap(), OffsetDateTime::now_utc(), None);
    assert!(!book.bids.is_empty(), "Coinbase returned no bids");
    assert!(!book.asks.is_empty(), "Coinbase returned no asks");
    assert!(BookSide::Bid.is_sorted(&book.bids));
    assert!(BookSide::Ask.is_sorted(&book.asks));

    println!(
        "Coinbase: {} bids, {} asks, {} discarded",
        book.bids.len(),
        book.asks.len(),
        book.discarded
    );
}

/// Test that Gemini returns a usable book.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_gemini_book() {
    let config = test_config();
    let http = build_http_client(&config).unwrap();
    let client = HttpVenueClient::gemini(&config, http).unwrap();

    let raw = client.fetch().await;
    assert!(raw.is_ok(), "Failed to fetch Gemini book: {:?}", raw.err());

    let book = normalize(VenueId::Gemini, &raw.unwrap(), OffsetDateTime::now_utc(), None);
    assert!(!book.bids.is_empty(), "Gemini returned no bids");
    assert!(!book.asks.is_empty(), "Gemini returned no asks");

    println!(
        "Gemini: {} bids, {} asks, {} discarded",
        book.bids.len(),
        book.asks.len(),
        book.discarded
    );
}

/// Test one full cycle against both venues.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_live_cycle() {
    let config = test_config();
    let http = build_http_client(&config).unwrap();
    let settings = CycleSettings::from(&config);

    let feeds: [Arc<dyn VenueFeed>; 2] = [
        Arc::new(HttpVenueClient::coinbase(&config, http.clone()).unwrap()),
        Arc::new(HttpVenueClient::gemini(&config, http).unwrap()),
    ];
    let slots = VenueId::ALL.map(|venue| Arc::new(VenueSlot::new(venue)));

    for (feed, slot) in feeds.into_iter().zip(slots.iter()) {
        let poller = VenuePoller::new(
            feed,
            Arc::clone(slot),
            settings.poll_interval,
            Duration::from_secs(10),
            Some(50),
        );
        if let Err(e) = poller.poll_once().await {
            println!("Fetch failed: {}", e);
        }
    }

    let report = CycleController::new(slots, settings).run_cycle().unwrap();

    assert!(report.buy.filled_quantity <= report.quantity);
    assert!(report.sell.filled_quantity <= report.quantity);
    if let (Some(buy), Some(sell)) = (report.buy.average_price, report.sell.average_price) {
        println!("Buy avg: {}  Sell avg: {}", buy, sell);
    }
}
