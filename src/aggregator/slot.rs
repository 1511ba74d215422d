//! Last-known-good book per venue.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;

use crate::error::FetchError;
use crate::orderbook::VenueBook;
use crate::venue::VenueId;

/// What a venue's poller has most recently reported.
#[derive(Debug, Clone, Default)]
pub struct SlotState {
    /// Most recent successfully normalized book.
    pub book: Option<Arc<VenueBook>>,
    /// When the most recent fetch attempt finished.
    pub last_attempt_at: Option<OffsetDateTime>,
    /// Failed attempts since the last success.
    pub consecutive_failures: u32,
    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
}

/// Single-writer slot holding a venue's [`SlotState`].
///
/// Every update replaces the state in one step under the channel's lock, so
/// readers see either the old state or the new one.
#[derive(Debug)]
pub struct VenueSlot {
    venue: VenueId,
    tx: watch::Sender<SlotState>,
}

impl VenueSlot {
    /// Create an empty slot.
    pub fn new(venue: VenueId) -> Self {
        let (tx, _rx) = watch::channel(SlotState::default());
        Self { venue, tx }
    }

    /// Venue this slot belongs to.
    pub fn venue(&self) -> VenueId {
        self.venue
    }

    /// Store a freshly normalized book.
    pub fn publish_book(&self, book: VenueBook) {
        let at = book.observed_at;
        self.tx.send_replace(SlotState {
            book: Some(Arc::new(book)),
            last_attempt_at: Some(at),
            consecutive_failures: 0,
            last_error: None,
        });
    }

    /// Record a failed fetch; the previous book stays in place.
    pub fn record_failure(&self, at: OffsetDateTime, error: &FetchError) {
        let message = error.to_string();
        self.tx.send_modify(|state| {
            state.last_attempt_at = Some(at);
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_error = Some(message);
        });
    }

    /// Current state, without waiting.
    pub fn snapshot(&self) -> SlotState {
        self.tx.borrow().clone()
    }
}
