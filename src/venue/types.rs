//! Venue identifiers and raw snapshot shapes.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::LevelError;

/// Trading venue supplying an independent order book.
///
/// The derived ordering is the canonical venue order used to break merge ties
/// between books observed at the same instant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum VenueId {
    /// Coinbase Exchange.
    Coinbase,
    /// Gemini.
    Gemini,
}

impl VenueId {
    /// All supported venues in canonical order.
    pub const ALL: [VenueId; 2] = [VenueId::Coinbase, VenueId::Gemini];

    /// Human-readable venue name.
    pub fn label(&self) -> &'static str {
        match self {
            VenueId::Coinbase => "Coinbase",
            VenueId::Gemini => "Gemini",
        }
    }
}

/// One level as it arrives from a venue.
///
/// Coinbase level-2 books send `["price", "size", num_orders]`; Gemini sends
/// `{"price": "...", "amount": "...", "timestamp": "..."}`. Anything else is
/// kept so that it can be counted as malformed instead of failing the whole
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLevel {
    /// Positional `[price, quantity, ...]`.
    Positional(Vec<Value>),
    /// Keyed `{price, amount|size|quantity}`.
    Keyed {
        /// Price field.
        #[serde(default)]
        price: Option<Value>,
        /// Quantity field, under any of the names venues use.
        #[serde(default, alias = "size", alias = "quantity")]
        amount: Option<Value>,
    },
    /// Unrecognised shape.
    Other(Value),
}

impl RawLevel {
    /// Build a keyed level from decimals, as Gemini would send it.
    pub fn keyed(price: Decimal, amount: Decimal) -> Self {
        RawLevel::Keyed {
            price: Some(Value::String(price.to_string())),
            amount: Some(Value::String(amount.to_string())),
        }
    }

    /// Build a positional level from decimals, as Coinbase would send it.
    pub fn positional(price: Decimal, size: Decimal) -> Self {
        RawLevel::Positional(vec![
            Value::String(price.to_string()),
            Value::String(size.to_string()),
            Value::from(1),
        ])
    }

    /// Extract `(price, quantity)`. Sign checks are left to the caller.
    pub fn parse(&self) -> Result<(Decimal, Decimal), LevelError> {
        let (price, quantity) = match self {
            RawLevel::Positional(fields) => (fields.first(), fields.get(1)),
            RawLevel::Keyed { price, amount } => (price.as_ref(), amount.as_ref()),
            RawLevel::Other(value) => {
                return Err(LevelError::Unparseable(format!("unexpected level shape: {value}")))
            }
        };

        let price = price
            .ok_or_else(|| LevelError::Unparseable("missing price".to_string()))
            .and_then(|v| decimal_from_value(v, "price"))?;
        let quantity = quantity
            .ok_or_else(|| LevelError::Unparseable("missing quantity".to_string()))
            .and_then(|v| decimal_from_value(v, "quantity"))?;

        Ok((price, quantity))
    }
}

fn decimal_from_value(value: &Value, field: &str) -> Result<Decimal, LevelError> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(LevelError::Unparseable(format!("{field} is not a number: {other}")))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| LevelError::Unparseable(format!("{field} {text:?} is not a decimal")))
}

/// Raw venue snapshot: whatever bid/ask arrays the venue returned.
///
/// Extra fields (`sequence`, `time`, ...) are ignored. A missing or `null`
/// side is a valid empty side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Bid levels in venue order.
    #[serde(default)]
    pub bids: Option<Vec<RawLevel>>,
    /// Ask levels in venue order.
    #[serde(default)]
    pub asks: Option<Vec<RawLevel>>,
}

impl RawSnapshot {
    /// Build a snapshot of keyed levels from `(price, quantity)` pairs.
    pub fn from_pairs(bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> Self {
        let side = |levels: &[(Decimal, Decimal)]| {
            levels
                .iter()
                .map(|&(price, quantity)| RawLevel::keyed(price, quantity))
                .collect::<Vec<_>>()
        };

        Self {
            bids: Some(side(bids)),
            asks: Some(side(asks)),
        }
    }

    /// Number of raw levels across both sides.
    pub fn level_count(&self) -> usize {
        self.bids.as_ref().map_or(0, Vec::len) + self.asks.as_ref().map_or(0, Vec::len)
    }
}
