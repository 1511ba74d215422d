//! Two-venue book merge.

use tracing::debug;

use super::types::{BookSide, PriceLevel, UnifiedBook, VenueBook};

/// Merge two venue books into one [`UnifiedBook`].
///
/// Each side is a single merge pass over the already-sorted inputs, O(n + m).
/// Levels are never coalesced, so equal prices from both venues stay as
/// separate entries. On equal price, the level from the earlier-observed book
/// goes first; books observed at the same instant fall back to canonical venue
/// order (Coinbase, then Gemini). An empty side in one input yields a copy of
/// the other input's side.
pub fn merge(a: &VenueBook, b: &VenueBook) -> UnifiedBook {
    let (first, second) = if (a.observed_at, a.venue) <= (b.observed_at, b.venue) {
        (a, b)
    } else {
        (b, a)
    };

    let bids = merge_side(&first.bids, &second.bids, BookSide::Bid);
    let asks = merge_side(&first.asks, &second.asks, BookSide::Ask);

    debug!(
        first = %first.venue,
        second = %second.venue,
        bids = bids.len(),
        asks = asks.len(),
        "Merged venue books"
    );

    UnifiedBook::from_sides(bids, asks)
}

/// Merge two best-first sequences; `first` wins ties.
fn merge_side(first: &[PriceLevel], second: &[PriceLevel], side: BookSide) -> Vec<PriceLevel> {
    debug_assert!(side.is_sorted(first) && side.is_sorted(second));

    let mut merged = Vec::with_capacity(first.len() + second.len());
    let (mut i, mut j) = (0, 0);

    while i < first.len() && j < second.len() {
        if side.at_or_ahead(first[i].price(), second[j].price()) {
            merged.push(first[i]);
            i += 1;
        } else {
            merged.push(second[j]);
            j += 1;
        }
    }

    merged.extend_from_slice(&first[i..]);
    merged.extend_from_slice(&second[j..]);
    merged
}
