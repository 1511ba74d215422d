//! Venue module: the data collaborators behind the aggregator.
//!
//! This module handles:
//! - Venue identifiers and raw snapshot shapes
//! - The [`VenueFeed`] seam the pollers fetch through
//! - HTTP clients for Coinbase and Gemini
//! - Mock feed for testing

pub mod client;
pub mod mock;
pub mod types;

use async_trait::async_trait;

use crate::error::FetchError;

pub use client::{build_http_client, http_feeds, venue_feeds, HttpVenueClient};
pub use mock::{MockFeedConfig, MockVenueFeed};
pub use types::{RawLevel, RawSnapshot, VenueId};

/// Source of full order book snapshots for one venue.
#[async_trait]
pub trait VenueFeed: Send + Sync {
    /// Venue this feed reports for.
    fn venue(&self) -> VenueId;

    /// Fetch the current full snapshot.
    async fn fetch(&self) -> Result<RawSnapshot, FetchError>;
}
