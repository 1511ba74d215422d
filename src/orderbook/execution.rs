//! Execution price calculation by walking the unified book.

use rust_decimal::Decimal;
use tracing::instrument;

use super::types::{ExecutionResult, PriceLevel, Side, UnifiedBook};
use crate::error::ExecutionError;

/// Walk the unified book to price an order of `quantity` on `side`.
///
/// Buys consume asks from the lowest price up, sells consume bids from the
/// highest price down. Running out of levels is not an error: the result
/// carries the partial fill with `fully_filled == false`, or no average price
/// at all when the side is empty. A notional beyond the decimal range is
/// reported as [`ExecutionError::NotionalOverflow`].
#[instrument(level = "debug", skip(book), fields(side = %side, quantity = %quantity))]
pub fn execution_price(
    book: &UnifiedBook,
    side: Side,
    quantity: Decimal,
) -> Result<ExecutionResult, ExecutionError> {
    if quantity <= Decimal::ZERO {
        return Err(ExecutionError::InvalidQuantity(quantity));
    }

    walk_levels(book.side(side.book_side()), side, quantity)
}

/// Consume `levels` best-first until `quantity` is filled or they run out.
fn walk_levels(
    levels: &[PriceLevel],
    side: Side,
    quantity: Decimal,
) -> Result<ExecutionResult, ExecutionError> {
    let mut remaining = quantity;
    let mut notional = Decimal::ZERO;
    let mut consumed = Vec::new();

    for level in levels {
        if remaining.is_zero() {
            break;
        }

        let take = remaining.min(level.quantity());
        notional = take
            .checked_mul(level.price())
            .and_then(|cost| notional.checked_add(cost))
            .ok_or_else(|| ExecutionError::NotionalOverflow {
                side,
                filled: quantity - remaining,
            })?;
        remaining -= take;
        consumed.push(level.take(take));
    }

    let filled_quantity = quantity - remaining;
    let average_price = if filled_quantity.is_zero() {
        None
    } else {
        Some(notional / filled_quantity)
    };

    Ok(ExecutionResult {
        side,
        requested_quantity: quantity,
        filled_quantity,
        notional,
        average_price,
        worst_price: consumed.last().map(PriceLevel::price),
        levels_consumed: consumed,
        fully_filled: remaining.is_zero(),
    })
}
