//! Unified error types for the order book aggregator.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::orderbook::Side;
use crate::venue::VenueId;

/// Unified error type for the aggregator.
#[derive(Error, Debug)]
pub enum AggregatorError {
    /// Configuration validation error.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Venue fetch error.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Execution price calculation error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Aggregation cycle error.
    #[error("cycle error: {0}")]
    Cycle(#[from] CycleError),

    /// HTTP client construction error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Target quantity must be strictly positive.
    #[error("TARGET_QUANTITY must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    /// Price increment must be strictly positive.
    #[error("PRICE_INCREMENT must be positive, got {0}")]
    NonPositiveIncrement(Decimal),

    /// Poll interval of zero would spin.
    #[error("POLL_INTERVAL_MS must be greater than zero")]
    ZeroPollInterval,

    /// Fetch timeout must leave room under the staleness ceiling.
    #[error("FETCH_TIMEOUT_MS ({timeout_ms}) must be below MAX_STALENESS_MS ({max_staleness_ms})")]
    TimeoutExceedsStaleness {
        /// Configured fetch timeout.
        timeout_ms: u64,
        /// Configured staleness ceiling.
        max_staleness_ms: u64,
    },

    /// A depth limit of zero would drop every level.
    #[error("BOOK_DEPTH must be at least 1 when set")]
    ZeroDepth,

    /// A venue URL could not be parsed or used as a base.
    #[error("{field} is not a usable base URL: {reason}")]
    InvalidUrl {
        /// Offending configuration field.
        field: &'static str,
        /// Why the URL was rejected.
        reason: String,
    },
}

/// Venue fetch failures. All of them are non-fatal for a cycle.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The fetch did not complete within the configured timeout.
    #[error("{venue} fetch timed out after {timeout_ms}ms")]
    Timeout {
        /// Venue that timed out.
        venue: VenueId,
        /// Timeout that was exceeded.
        timeout_ms: u64,
    },

    /// Transport-level failure.
    #[error("{venue} request failed: {source}")]
    Http {
        /// Venue being fetched.
        venue: VenueId,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("{venue} returned HTTP {status}")]
    Status {
        /// Venue being fetched.
        venue: VenueId,
        /// Status code returned.
        status: u16,
    },

    /// Payload could not be decoded into a snapshot.
    #[error("{venue} returned a malformed payload: {reason}")]
    Malformed {
        /// Venue being fetched.
        venue: VenueId,
        /// Decoder message.
        reason: String,
    },
}

impl FetchError {
    /// Venue the failure belongs to.
    pub fn venue(&self) -> VenueId {
        match self {
            FetchError::Timeout { venue, .. }
            | FetchError::Http { venue, .. }
            | FetchError::Status { venue, .. }
            | FetchError::Malformed { venue, .. } => *venue,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Http { .. } => "http",
            FetchError::Status { .. } => "status",
            FetchError::Malformed { .. } => "malformed",
        }
    }
}

/// Reasons a raw level is discarded during normalization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    /// Price is zero or negative.
    #[error("price {0} is not positive")]
    NonPositivePrice(Decimal),

    /// Quantity is zero or negative.
    #[error("quantity {0} is not positive")]
    NonPositiveQuantity(Decimal),

    /// `price * quantity` does not fit in a decimal.
    #[error("notional of {quantity} at {price} overflows")]
    NotionalOverflow {
        /// Level price.
        price: Decimal,
        /// Level quantity.
        quantity: Decimal,
    },

    /// Price or quantity missing or not a number.
    #[error("unparseable level: {0}")]
    Unparseable(String),
}

/// Execution price calculation errors.
///
/// Running out of liquidity is not an error; see
/// [`ExecutionOutcome`](crate::orderbook::ExecutionOutcome).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Requested quantity must be strictly positive.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    /// Accumulated notional left the decimal range.
    #[error("{side} notional overflowed after filling {filled}")]
    NotionalOverflow {
        /// Side being walked.
        side: Side,
        /// Quantity filled before the overflow.
        filled: Decimal,
    },
}

/// Cycle-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// No venue has a usable book: never fetched, or expired.
    #[error("no usable book from any venue (never seen: {never_seen:?}, expired: {expired:?})")]
    BothVenuesStale {
        /// Venues that never produced a successful snapshot.
        never_seen: Vec<VenueId>,
        /// Venues whose last book is older than the staleness ceiling.
        expired: Vec<VenueId>,
    },

    /// Execution calculation rejected the configured quantity.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AggregatorError>;
