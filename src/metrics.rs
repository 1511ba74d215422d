//! Prometheus metrics for latency tracking and monitoring.
//!
//! This module provides metrics for:
//! - Venue fetch latency and failures
//! - Malformed levels discarded during normalization
//! - Aggregation cycle latency, outcomes and stale-venue reuse

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

use crate::venue::VenueId;

// === Metric Name Constants ===

/// Venue fetch latency metric name (includes timeouts and failures).
pub const METRIC_VENUE_FETCH_LATENCY: &str = "venue_fetch_latency_ms";
/// HTTP request latency metric name (successful responses only).
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Cycle latency metric name.
pub const METRIC_CYCLE_LATENCY: &str = "cycle_latency_ms";
/// Venue fetch failures counter metric name.
pub const METRIC_VENUE_FETCH_FAILURES: &str = "venue_fetch_failures_total";
/// Discarded levels counter metric name.
pub const METRIC_LEVELS_DISCARDED: &str = "levels_discarded_total";
/// Published cycles counter metric name.
pub const METRIC_CYCLES_PUBLISHED: &str = "cycles_published_total";
/// Failed cycles counter metric name.
pub const METRIC_CYCLES_FAILED: &str = "cycles_failed_total";
/// Stale venue reuse counter metric name.
pub const METRIC_STALE_VENUE_CYCLES: &str = "stale_venue_cycles_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_VENUE_FETCH_LATENCY,
        "Venue fetch latency in milliseconds, including failed attempts"
    );
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_CYCLE_LATENCY,
        "Merge and execution pricing latency per cycle in milliseconds"
    );

    // Counters
    describe_counter!(
        METRIC_VENUE_FETCH_FAILURES,
        "Total number of failed venue fetches"
    );
    describe_counter!(
        METRIC_LEVELS_DISCARDED,
        "Total number of malformed levels discarded while normalizing"
    );
    describe_counter!(
        METRIC_CYCLES_PUBLISHED,
        "Total number of cycle results published"
    );
    describe_counter!(
        METRIC_CYCLES_FAILED,
        "Total number of cycles with no usable venue data"
    );
    describe_counter!(
        METRIC_STALE_VENUE_CYCLES,
        "Total number of cycles that reused a venue's last-known book"
    );

    debug!("Metrics initialized");
}

/// Record a venue fetch attempt's latency.
pub fn record_venue_fetch_latency(start: Instant, venue: VenueId) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_VENUE_FETCH_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, venue: VenueId) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Increment venue fetch failures counter.
pub fn inc_venue_fetch_failures(venue: VenueId, kind: &'static str) {
    counter!(METRIC_VENUE_FETCH_FAILURES, "venue" => venue.to_string(), "kind" => kind)
        .increment(1);
}

/// Add to the discarded levels counter.
pub fn inc_levels_discarded(venue: VenueId, count: usize) {
    counter!(METRIC_LEVELS_DISCARDED, "venue" => venue.to_string()).increment(count as u64);
}

/// Increment published cycles counter.
pub fn inc_cycles_published() {
    counter!(METRIC_CYCLES_PUBLISHED).increment(1);
}

/// Increment failed cycles counter.
pub fn inc_cycles_failed() {
    counter!(METRIC_CYCLES_FAILED).increment(1);
}

/// Increment stale venue reuse counter.
pub fn inc_stale_venue_cycles(venue: VenueId) {
    counter!(METRIC_STALE_VENUE_CYCLES, "venue" => venue.to_string()).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for one aggregation cycle.
pub fn timer_cycle() -> LatencyTimer {
    LatencyTimer::new(METRIC_CYCLE_LATENCY)
}
