//! `GET /health`: liveness of the HTTP server.
//!
//! The Docker daemon is deliberately not probed here; `/docker/list` reports
//! socket problems.

use super::response::ApiResponse;
use crate::server::ChaosAgent;
use axum::Extension;
use serde::Serialize;
use std::sync::Arc;

/// Payload of the health envelope.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Agent version.
    pub version: &'static str,
    /// Fault executions that have not reached a terminal event.
    pub active_faults: usize,
    /// Seconds since the agent started.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    fn of(agent: &ChaosAgent) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            active_faults: agent.engine().active().len(),
            uptime_seconds: agent.uptime_seconds(),
        }
    }
}

/// Health check handler.
pub async fn health_handler(Extension(agent): Extension<Arc<ChaosAgent>>) -> ApiResponse {
    ApiResponse::ok("Server is running").with_data(HealthStatus::of(&agent))
}
