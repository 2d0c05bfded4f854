//! HTTP endpoints for chaosd.
//!
//! Health, metrics, the live host-fault feed and the container API.

mod docker;
mod faults;
pub mod health;
mod host;
mod metrics;
pub mod response;

use crate::server::ChaosAgent;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;

pub use health::HealthStatus;
pub use response::ApiResponse;

/// Build the HTTP router with all endpoints.
pub fn build_router(agent: Arc<ChaosAgent>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/faults", get(faults::list_handler))
        .route("/host/inject", get(host::inject_handler))
        .route("/docker/list", get(docker::list_handler))
        .route("/docker/status", get(docker::status_handler))
        .route("/docker/start", post(docker::start_handler))
        .route("/docker/stop", post(docker::stop_handler))
        .route("/docker/fault", post(docker::fault_handler))
        .layer(Extension(agent))
}
