//! Published cycle results.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;
use time::OffsetDateTime;

use super::slot::SlotState;
use crate::orderbook::{ExecutionResult, PriceLevel, UnifiedBook};
use crate::utils::millis_between;
use crate::venue::VenueId;

/// How current a venue's contribution to a cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Freshness {
    /// Latest fetch succeeded and the book is recent.
    Fresh,
    /// Last-known book reused; the latest fetch failed or is overdue.
    Stale,
    /// Last-known book is older than the staleness ceiling and is not merged.
    Expired,
    /// The venue has never produced a book.
    Missing,
}

impl Freshness {
    /// Classify a slot at `now`.
    ///
    /// A book is fresh while the latest attempt succeeded and its age is
    /// within one poll interval plus one fetch timeout; it stays usable as
    /// stale up to `max_staleness`.
    pub fn classify(
        state: &SlotState,
        now: OffsetDateTime,
        fresh_window: Duration,
        max_staleness: Duration,
    ) -> Self {
        let Some(book) = &state.book else {
            return Freshness::Missing;
        };

        let age_ms = i128::from(millis_between(book.observed_at, now));
        if age_ms > max_staleness.as_millis() as i128 {
            Freshness::Expired
        } else if state.consecutive_failures > 0 || age_ms > fresh_window.as_millis() as i128 {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// Whether the venue's book is merged this cycle.
    pub fn is_usable(&self) -> bool {
        matches!(self, Freshness::Fresh | Freshness::Stale)
    }
}

/// Per-venue metadata attached to a cycle result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VenueStatus {
    /// Venue described.
    pub venue: VenueId,
    /// Freshness classification for this cycle.
    pub freshness: Freshness,
    /// When the venue's book was observed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub observed_at: Option<OffsetDateTime>,
    /// Book age at cycle time in milliseconds.
    pub age_ms: Option<i64>,
    /// When the latest fetch attempt finished, successful or not.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<OffsetDateTime>,
    /// Bid levels contributed.
    pub bid_levels: usize,
    /// Ask levels contributed.
    pub ask_levels: usize,
    /// Malformed levels dropped from the venue's book.
    pub discarded_levels: usize,
    /// Failed fetches since the last success.
    pub consecutive_failures: u32,
    /// Most recent fetch error.
    pub last_error: Option<String>,
}

impl VenueStatus {
    /// Describe `state` at `now`.
    pub fn from_state(
        venue: VenueId,
        state: &SlotState,
        freshness: Freshness,
        now: OffsetDateTime,
    ) -> Self {
        let book = state.book.as_deref();
        let contributes = freshness.is_usable();

        Self {
            venue,
            freshness,
            observed_at: book.map(|b| b.observed_at),
            age_ms: book.map(|b| millis_between(b.observed_at, now)),
            last_attempt_at: state.last_attempt_at,
            bid_levels: book.filter(|_| contributes).map_or(0, |b| b.bids.len()),
            ask_levels: book.filter(|_| contributes).map_or(0, |b| b.asks.len()),
            discarded_levels: book.map_or(0, |b| b.discarded),
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error.clone(),
        }
    }
}

/// Everything one aggregation cycle publishes.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Monotonic cycle number, starting at 1.
    pub sequence: u64,
    /// When the cycle ran.
    #[serde(with = "time::serde::rfc3339")]
    pub produced_at: OffsetDateTime,
    /// Quantity priced on each side.
    pub quantity: Decimal,
    /// Merged book.
    pub book: UnifiedBook,
    /// Buy execution against the asks.
    pub buy: ExecutionResult,
    /// Sell execution against the bids.
    pub sell: ExecutionResult,
    /// Per-venue freshness, in canonical venue order.
    pub venues: Vec<VenueStatus>,
}

impl CycleReport {
    /// Unified best bid.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.book.best_bid()
    }

    /// Unified best ask.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.book.best_ask()
    }

    /// Status of one venue.
    pub fn venue(&self, venue: VenueId) -> Option<&VenueStatus> {
        self.venues.iter().find(|s| s.venue == venue)
    }

    /// Venues whose last-known book was reused.
    pub fn stale_venues(&self) -> Vec<VenueId> {
        self.venues_with(Freshness::Stale)
    }

    /// Venues left out of the merge.
    pub fn excluded_venues(&self) -> Vec<VenueId> {
        self.venues
            .iter()
            .filter(|s| !s.freshness.is_usable())
            .map(|s| s.venue)
            .collect()
    }

    /// Whether any venue was not fresh.
    pub fn is_degraded(&self) -> bool {
        self.venues.iter().any(|s| s.freshness != Freshness::Fresh)
    }

    fn venues_with(&self, freshness: Freshness) -> Vec<VenueId> {
        self.venues
            .iter()
            .filter(|s| s.freshness == freshness)
            .map(|s| s.venue)
            .collect()
    }
}
