//! Aggregator module: polling, staleness tracking and the cycle loop.
//!
//! This module handles:
//! - Per-venue polling tasks bounded by a fetch timeout
//! - Last-known-good book slots shared with the cycle loop
//! - Freshness classification and the published [`CycleReport`]
//! - The interval-driven [`CycleController`]

pub mod controller;
pub mod poller;
pub mod report;
pub mod slot;

pub use controller::{
    spawn_aggregator, AggregatorHandle, CycleController, CycleSettings, ReportReceiver,
};
pub use poller::VenuePoller;
pub use report::{CycleReport, Freshness, VenueStatus};
pub use slot::{SlotState, VenueSlot};
