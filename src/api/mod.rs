//! HTTP API module for health, metrics, and aggregated book endpoints.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
