//! Coinbase + Gemini BTC-USD order book aggregator.
//!
//! This library polls the full order book of two venues, merges them into one
//! unified book with venue attribution on every level, and prices a target
//! quantity against it with exact decimal arithmetic.
//!
//! # Pipeline
//!
//! Each venue is fetched by its own poller; the cycle loop never waits on a
//! venue and reuses the last good book when a fetch fails or times out:
//!
//! ```text
//! Coinbase fetch ─► normalize ─► slot ─┐
//!                                      ├─► merge ─► execution price (buy / sell) ─► CycleReport
//! Gemini fetch   ─► normalize ─► slot ─┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`venue`]: Venue identifiers, raw snapshots and HTTP feeds
//! - [`orderbook`]: Normalizer, merger and execution price calculator
//! - [`aggregator`]: Pollers, staleness tracking and the cycle loop
//! - [`display`]: Text rendering of cycle reports
//! - [`api`]: HTTP API for health, metrics and the latest cycle
//! - [`metrics`]: Prometheus metric helpers
//! - [`utils`]: Utility functions

pub mod aggregator;
pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod metrics;
pub mod orderbook;
pub mod utils;
pub mod venue;

pub use config::Config;
pub use error::{AggregatorError, Result};
