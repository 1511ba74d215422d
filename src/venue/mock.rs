//! Mock venue feed for unit testing.
//!
//! This module provides a feed that can be used in tests
//! without making real network requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::types::{RawSnapshot, VenueId};
use super::VenueFeed;
use crate::error::FetchError;

/// Configuration for mock feed behavior.
#[derive(Debug, Clone, Default)]
pub struct MockFeedConfig {
    /// Fail every fetch with this HTTP status.
    pub fail_status: Option<u16>,
    /// Fail every fetch with a malformed-payload error.
    pub fail_malformed: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

#[derive(Debug, Default)]
struct MockState {
    config: MockFeedConfig,
    snapshot: RawSnapshot,
}

/// Mock venue feed. Clones share state, so a test can keep a handle and
/// reconfigure the feed after handing it to a poller.
#[derive(Debug, Clone)]
pub struct MockVenueFeed {
    venue: VenueId,
    state: Arc<Mutex<MockState>>,
    calls: Arc<AtomicUsize>,
}

impl MockVenueFeed {
    /// Create a feed that returns an empty snapshot.
    pub fn new(venue: VenueId) -> Self {
        Self::with_config(venue, MockFeedConfig::default())
    }

    /// Create a feed with custom failure/latency behavior.
    pub fn with_config(venue: VenueId, config: MockFeedConfig) -> Self {
        Self {
            venue,
            state: Arc::new(Mutex::new(MockState {
                config,
                snapshot: RawSnapshot::default(),
            })),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a feed serving the given `(price, quantity)` levels.
    pub fn with_levels(
        venue: VenueId,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> Self {
        let feed = Self::new(venue);
        feed.set_snapshot(RawSnapshot::from_pairs(bids, asks));
        feed
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the snapshot returned by subsequent fetches.
    pub fn set_snapshot(&self, snapshot: RawSnapshot) {
        self.state().snapshot = snapshot;
    }

    /// Make subsequent fetches fail with `status`, or succeed again with `None`.
    pub fn set_fail_status(&self, status: Option<u16>) {
        self.state().config.fail_status = status;
    }

    /// Make subsequent fetches return a malformed-payload error.
    pub fn set_fail_malformed(&self, fail: bool) {
        self.state().config.fail_malformed = fail;
    }

    /// Change the simulated latency.
    pub fn set_latency_ms(&self, latency_ms: u64) {
        self.state().config.latency_ms = latency_ms;
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueFeed for MockVenueFeed {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn fetch(&self) -> Result<RawSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency_ms = self.state().config.latency_ms;
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }

        let state = self.state();
        if let Some(status) = state.config.fail_status {
            return Err(FetchError::Status {
                venue: self.venue,
                status,
            });
        }
        if state.config.fail_malformed {
            return Err(FetchError::Malformed {
                venue: self.venue,
                reason: "mock malformed payload".to_string(),
            });
        }

        Ok(state.snapshot.clone())
    }
}
