//! Order book module for the venue books and the unified book.
//!
//! This module handles:
//! - Order book types and data structures
//! - Normalizing raw venue snapshots
//! - Merging two venue books into one unified book
//! - Execution price calculations against the unified book

pub mod execution;
pub mod merge;
pub mod normalize;
pub mod types;

pub use execution::execution_price;
pub use merge::merge;
pub use normalize::normalize;
pub use types::{
    BookSide, ExecutionOutcome, ExecutionResult, PriceLevel, Side, UnifiedBook, VenueBook,
};
