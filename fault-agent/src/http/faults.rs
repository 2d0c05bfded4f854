//! Listing of in-flight fault executions.

use super::ApiResponse;
use crate::server::ChaosAgent;
use axum::Extension;
use serde_json::json;
use std::sync::Arc;

/// `GET /faults`
pub async fn list_handler(Extension(agent): Extension<Arc<ChaosAgent>>) -> ApiResponse {
    let faults = agent.engine().active().snapshot();
    let count = faults.len();
    ApiResponse::ok("success").with_data(json!({ "faults": faults, "count": count }))
}
