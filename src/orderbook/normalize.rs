//! Raw venue snapshot to canonical [`VenueBook`].

use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::types::{BookSide, PriceLevel, VenueBook};
use crate::metrics;
use crate::venue::{RawLevel, RawSnapshot, VenueId};

/// Normalize a raw snapshot into a sorted, validated [`VenueBook`].
///
/// Levels with a non-positive or unparseable price or quantity, or whose
/// notional does not fit in a decimal, are dropped individually and counted
/// in [`VenueBook::discarded`]. A missing side is an empty side. Sorting is
/// stable, so levels at an equal price keep their original order. With
/// `depth` set, only the best `depth` levels per side are kept.
#[instrument(level = "debug", skip(raw), fields(venue = %venue, raw_levels = raw.level_count()))]
pub fn normalize(
    venue: VenueId,
    raw: &RawSnapshot,
    observed_at: OffsetDateTime,
    depth: Option<usize>,
) -> VenueBook {
    let mut discarded = 0;
    let bids = normalize_side(venue, raw.bids.as_deref(), BookSide::Bid, depth, &mut discarded);
    let asks = normalize_side(venue, raw.asks.as_deref(), BookSide::Ask, depth, &mut discarded);

    if discarded > 0 {
        metrics::inc_levels_discarded(venue, discarded);
    }

    VenueBook {
        venue,
        bids,
        asks,
        observed_at,
        discarded,
    }
}

fn normalize_side(
    venue: VenueId,
    raw: Option<&[RawLevel]>,
    side: BookSide,
    depth: Option<usize>,
    discarded: &mut usize,
) -> Vec<PriceLevel> {
    let raw = raw.unwrap_or_default();
    let mut levels = Vec::with_capacity(raw.len());

    for (index, level) in raw.iter().enumerate() {
        let parsed = level
            .parse()
            .and_then(|(price, quantity)| PriceLevel::new(price, quantity, venue));

        match parsed {
            Ok(level) => levels.push(level),
            Err(reason) => {
                *discarded += 1;
                debug!(venue = %venue, side = %side, index, %reason, "Discarding malformed level");
            }
        }
    }

    if !side.is_sorted(&levels) {
        side.sort(&mut levels);
    }

    if let Some(depth) = depth {
        levels.truncate(depth);
    }

    levels
}
