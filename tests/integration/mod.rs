//! Integration tests for the order book aggregator.
//!
//! `pipeline` drives pollers, the cycle loop and the HTTP API against mock
//! feeds. `live` talks to the real Coinbase and Gemini endpoints and is ignored
//! by default.
//! Run with: cargo test --test integration -- --ignored

mod live;
mod pipeline;
