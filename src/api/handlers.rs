//! HTTP API handlers.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::aggregator::{CycleReport, ReportReceiver, VenueStatus};
use crate::orderbook::{ExecutionOutcome, ExecutionResult, PriceLevel};
use crate::utils::round_to_increment;

/// Levels per side returned by `/api/v1/book` when no depth is given.
pub const DEFAULT_BOOK_DEPTH: usize = 10;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Latest published cycle.
    pub reports: ReportReceiver,
    /// Increment average prices are rounded to for display.
    pub price_increment: Decimal,
    /// Prometheus handle when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(reports: ReportReceiver, price_increment: Decimal) -> Self {
        Self {
            reports,
            price_increment,
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Most recent report, if any cycle has been published.
    pub fn latest(&self) -> Option<Arc<CycleReport>> {
        self.reports.borrow().clone()
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.reports.borrow().is_some()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether a cycle has been published.
    pub ready: bool,
    /// Sequence of the latest cycle.
    pub sequence: Option<u64>,
}

/// Error body for requests that cannot be served yet.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: &'static str,
}

/// Query for `/api/v1/book`.
#[derive(Debug, Deserialize)]
pub struct BookQuery {
    /// Levels per side.
    pub depth: Option<usize>,
}

/// Unified book response.
#[derive(Debug, Serialize)]
pub struct BookResponse {
    /// Cycle sequence.
    pub sequence: u64,
    /// When the cycle ran.
    #[serde(with = "time::serde::rfc3339")]
    pub produced_at: OffsetDateTime,
    /// Best bid across venues.
    pub best_bid: Option<PriceLevel>,
    /// Best ask across venues.
    pub best_ask: Option<PriceLevel>,
    /// Best ask minus best bid.
    pub spread: Option<Decimal>,
    /// Midpoint of best bid and ask.
    pub mid_price: Option<Decimal>,
    /// Top bid levels.
    pub bids: Vec<PriceLevel>,
    /// Top ask levels.
    pub asks: Vec<PriceLevel>,
}

/// One side's execution with its display price.
#[derive(Debug, Serialize)]
pub struct ExecutionView {
    /// Filled, partial or no liquidity.
    pub outcome: ExecutionOutcome,
    /// Average price rounded to the price increment.
    pub average_price_rounded: Option<Decimal>,
    /// Exact walk result.
    #[serde(flatten)]
    pub result: ExecutionResult,
}

impl ExecutionView {
    fn new(result: &ExecutionResult, increment: Decimal) -> Self {
        Self {
            outcome: result.outcome(),
            average_price_rounded: result
                .average_price
                .map(|p| round_to_increment(p, increment)),
            result: result.clone(),
        }
    }
}

/// Execution response.
#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    /// Cycle sequence.
    pub sequence: u64,
    /// When the cycle ran.
    #[serde(with = "time::serde::rfc3339")]
    pub produced_at: OffsetDateTime,
    /// Quantity priced.
    pub quantity: Decimal,
    /// Buy against the asks.
    pub buy: ExecutionView,
    /// Sell against the bids.
    pub sell: ExecutionView,
}

/// Venue freshness response.
#[derive(Debug, Serialize)]
pub struct VenuesResponse {
    /// Cycle sequence.
    pub sequence: u64,
    /// Whether any venue was not fresh.
    pub degraded: bool,
    /// Per-venue status.
    pub venues: Vec<VenueStatus>,
}

fn not_ready() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "no cycle published yet",
        }),
    )
        .into_response()
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 once a cycle is published, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let sequence = state.latest().map(|r| r.sequence);
    let response = ReadyResponse {
        ready: sequence.is_some(),
        sequence,
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Unified book handler - best levels and the top of each side.
pub async fn book(State(state): State<AppState>, Query(query): Query<BookQuery>) -> Response {
    let Some(report) = state.latest() else {
        return not_ready();
    };
    let depth = query.depth.unwrap_or(DEFAULT_BOOK_DEPTH);
    let book = &report.book;

    Json(BookResponse {
        sequence: report.sequence,
        produced_at: report.produced_at,
        best_bid: book.best_bid().copied(),
        best_ask: book.best_ask().copied(),
        spread: book.spread(),
        mid_price: book.mid_price(),
        bids: book.bids().iter().take(depth).copied().collect(),
        asks: book.asks().iter().take(depth).copied().collect(),
    })
    .into_response()
}

/// Execution handler - latest buy and sell prices.
pub async fn execution(State(state): State<AppState>) -> Response {
    let Some(report) = state.latest() else {
        return not_ready();
    };

    Json(ExecutionResponse {
        sequence: report.sequence,
        produced_at: report.produced_at,
        quantity: report.quantity,
        buy: ExecutionView::new(&report.buy, state.price_increment),
        sell: ExecutionView::new(&report.sell, state.price_increment),
    })
    .into_response()
}

/// Venues handler - per-venue freshness from the latest cycle.
pub async fn venues(State(state): State<AppState>) -> Response {
    let Some(report) = state.latest() else {
        return not_ready();
    };

    Json(VenuesResponse {
        sequence: report.sequence,
        degraded: report.is_degraded(),
        venues: report.venues.clone(),
    })
    .into_response()
}

/// Prometheus exposition handler.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
