//! HTTP handlers for the webhook router
//!
//! This module contains Axum handlers for the operational HTTP surface:
//! health probes, detailed status, and the Prometheus metrics export.
//! The webhook ingestion endpoint itself lives in [`crate::paystack::handler`].
//!
//! # Modules
//!
//! - [`status`] - Server status, health check, and metrics endpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use paystack_router::handlers::status::{AppState, status_router};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Set up status/health endpoints
//!     let app_state = Arc::new(AppState::new());
//!     let status_app = status_router(app_state);
//!
//!     // Merge and serve...
//! }
//! ```

pub mod status;

// Re-export commonly used items from status
pub use status::{
    // Handlers
    health_handler,
    metrics_handler,
    readiness_handler,
    status_handler,
    // Router
    status_router,
    // Types
    AppState,
    HealthResponse,
    LatencyHistogram,
    LatencyMetrics,
    MemoryMetrics,
    StatusResponse,
    // Constants
    SERVER_NAME,
    SERVER_VERSION,
};
