//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::error::LevelError;
use crate::venue::VenueId;

/// Side of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy: walks the asks from the lowest price up.
    #[strum(serialize = "BUY", serialize = "buy")]
    Buy,
    /// Sell: walks the bids from the highest price down.
    #[strum(serialize = "SELL", serialize = "sell")]
    Sell,
}

impl Side {
    /// The book side this execution consumes.
    pub fn book_side(&self) -> BookSide {
        match self {
            Side::Buy => BookSide::Ask,
            Side::Sell => BookSide::Bid,
        }
    }
}

/// One side of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BookSide {
    /// Bids, best (highest) first.
    Bid,
    /// Asks, best (lowest) first.
    Ask,
}

impl BookSide {
    /// Whether `a` ranks at or ahead of `b` on this side.
    pub fn at_or_ahead(&self, a: Decimal, b: Decimal) -> bool {
        match self {
            BookSide::Bid => a >= b,
            BookSide::Ask => a <= b,
        }
    }

    /// Whether `levels` is in best-first order for this side.
    pub fn is_sorted(&self, levels: &[PriceLevel]) -> bool {
        levels
            .windows(2)
            .all(|pair| self.at_or_ahead(pair[0].price, pair[1].price))
    }

    /// Stable sort of `levels` into best-first order.
    pub fn sort(&self, levels: &mut [PriceLevel]) {
        match self {
            BookSide::Bid => levels.sort_by(|a, b| b.price.cmp(&a.price)),
            BookSide::Ask => levels.sort_by(|a, b| a.price.cmp(&b.price)),
        }
    }
}

/// Single price level, attributed to the venue that quoted it.
///
/// Price and quantity are always strictly positive and their product fits in
/// a [`Decimal`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PriceLevel {
    price: Decimal,
    quantity: Decimal,
    venue: VenueId,
}

impl PriceLevel {
    /// Create a price level, rejecting non-positive price or quantity.
    pub fn new(price: Decimal, quantity: Decimal, venue: VenueId) -> Result<Self, LevelError> {
        if price <= Decimal::ZERO {
            return Err(LevelError::NonPositivePrice(price));
        }
        if quantity <= Decimal::ZERO {
            return Err(LevelError::NonPositiveQuantity(quantity));
        }
        if price.checked_mul(quantity).is_none() {
            return Err(LevelError::NotionalOverflow { price, quantity });
        }

        Ok(Self {
            price,
            quantity,
            venue,
        })
    }

    /// Price at this level.
    pub fn price(&self) -> Decimal {
        self.price
    }

    /// Quantity available at this price.
    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Venue quoting this level.
    pub fn venue(&self) -> VenueId {
        self.venue
    }

    /// `price * quantity`.
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Same level with part of its quantity. Callers pass `0 < quantity <= self.quantity`.
    pub(crate) fn take(&self, quantity: Decimal) -> Self {
        debug_assert!(quantity > Decimal::ZERO && quantity <= self.quantity);
        Self { quantity, ..*self }
    }
}

/// Canonical book for one venue from one poll.
///
/// Bids are sorted by price descending, asks ascending. Built by
/// [`normalize`](super::normalize::normalize).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueBook {
    /// Venue the book came from.
    pub venue: VenueId,
    /// Bid levels sorted by price descending.
    pub bids: Vec<PriceLevel>,
    /// Ask levels sorted by price ascending.
    pub asks: Vec<PriceLevel>,
    /// When the snapshot was received.
    pub observed_at: OffsetDateTime,
    /// Malformed levels dropped while normalizing.
    pub discarded: usize,
}

impl VenueBook {
    /// Book with no liquidity on either side.
    pub fn empty(venue: VenueId, observed_at: OffsetDateTime) -> Self {
        Self {
            venue,
            bids: Vec::new(),
            asks: Vec::new(),
            observed_at,
            discarded: 0,
        }
    }

    /// Levels on one side.
    pub fn side(&self, side: BookSide) -> &[PriceLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Best bid level.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask level.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Merged book across venues. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnifiedBook {
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl UnifiedBook {
    pub(crate) fn from_sides(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self { bids, asks }
    }

    /// Bid levels, highest price first.
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    /// Ask levels, lowest price first.
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Levels on one side.
    pub fn side(&self, side: BookSide) -> &[PriceLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Levels from one venue on one side, in unified order.
    pub fn venue_levels(
        &self,
        venue: VenueId,
        side: BookSide,
    ) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.side(side).iter().filter(move |l| l.venue == venue)
    }

    /// Best bid across venues.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask across venues.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Spread between best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Midpoint of best bid and best ask.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid
                .price
                .checked_add(ask.price)
                .map(|sum| sum / Decimal::TWO)
                .or_else(|| Some(bid.price / Decimal::TWO + ask.price / Decimal::TWO)),
            _ => None,
        }
    }

    /// Whether the best bid meets or exceeds the best ask (possible across venues).
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }
}

/// How an execution walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The full quantity was filled.
    Filled,
    /// The book ran out before the quantity was filled.
    Partial,
    /// Nothing on the walked side.
    NoLiquidity,
}

/// Result of walking the unified book for one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Buy or sell.
    pub side: Side,
    /// Quantity the walk tried to fill.
    pub requested_quantity: Decimal,
    /// Quantity actually filled.
    pub filled_quantity: Decimal,
    /// Total cost (buy) or revenue (sell) of the filled quantity.
    pub notional: Decimal,
    /// Volume-weighted average price; `None` when nothing filled.
    pub average_price: Option<Decimal>,
    /// Price of the last level touched.
    pub worst_price: Option<Decimal>,
    /// Consumed portion of each level touched, in walk order.
    pub levels_consumed: Vec<PriceLevel>,
    /// `filled_quantity == requested_quantity`.
    pub fully_filled: bool,
}

impl ExecutionResult {
    /// Filled, partial, or no liquidity.
    pub fn outcome(&self) -> ExecutionOutcome {
        if self.fully_filled {
            ExecutionOutcome::Filled
        } else if self.filled_quantity.is_zero() {
            ExecutionOutcome::NoLiquidity
        } else {
            ExecutionOutcome::Partial
        }
    }

    /// Quantity left unfilled.
    pub fn remaining_quantity(&self) -> Decimal {
        self.requested_quantity - self.filled_quantity
    }

    /// Quantity filled against one venue.
    pub fn filled_by_venue(&self, venue: VenueId) -> Decimal {
        self.levels_consumed
            .iter()
            .filter(|l| l.venue == venue)
            .map(|l| l.quantity)
            .sum()
    }
}
