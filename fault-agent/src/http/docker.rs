//! Container API: listing, status, lifecycle and synchronous container faults.

use super::ApiResponse;
use crate::server::ChaosAgent;
use axum::extract::rejection::JsonRejection;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::{Extension, Json};
use fault_engine::DriverError;
use fault_types::{FaultEvent, FaultSubmission, Phase};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Body of `/docker/start` and `/docker/stop`.
#[derive(Debug, Default, Deserialize)]
pub struct ContainerRequest {
    /// Target container.
    #[serde(default)]
    pub container_id: String,
}

/// Query of `/docker/status`.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Target container.
    #[serde(default)]
    pub container_id: String,
}

/// Body of `/docker/fault`.
#[derive(Debug, Default, Deserialize)]
pub struct ContainerFaultRequest {
    /// Target container.
    #[serde(default)]
    pub container_id: String,
    /// `cpu_choke`, `mem_limit` or `restore`.
    #[serde(default)]
    pub fault_type: String,
    /// Seconds to hold the constraint before restoring; absent means it stays.
    pub duration: Option<i64>,
}

/// Status code for a failed control-API call.
fn failure_status(err: &DriverError) -> StatusCode {
    match err {
        DriverError::Docker(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }) => StatusCode::NOT_FOUND,
        DriverError::Docker(bollard::errors::Error::DockerResponseServerError { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        DriverError::Docker(_) | DriverError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bad_body(rejection: JsonRejection) -> ApiResponse {
    ApiResponse::error(StatusCode::BAD_REQUEST, "Invalid request body").with_data(rejection.body_text())
}

/// `GET /docker/list`
pub async fn list_handler(Extension(agent): Extension<Arc<ChaosAgent>>) -> ApiResponse {
    match agent.containers().list().await {
        Ok(containers) => {
            let count = containers.len();
            ApiResponse::ok("success").with_data(json!({ "containers": containers, "count": count }))
        }
        Err(e) => {
            tracing::warn!("container listing failed: {}", e);
            ApiResponse::error(failure_status(&e), "Socket connection failed").with_data(e.to_string())
        }
    }
}

/// `GET /docker/status?container_id=<id>`; the message is the lifecycle state.
pub async fn status_handler(
    Extension(agent): Extension<Arc<ChaosAgent>>,
    Query(query): Query<StatusQuery>,
) -> ApiResponse {
    if query.container_id.trim().is_empty() {
        return ApiResponse::error(StatusCode::BAD_REQUEST, "Missing container_id");
    }

    match agent.containers().state(&query.container_id).await {
        Ok(state) => ApiResponse::ok(state),
        Err(e) => ApiResponse::error(failure_status(&e), "Container not found or error")
            .with_data(e.to_string()),
    }
}

/// `POST /docker/start`
pub async fn start_handler(
    Extension(agent): Extension<Arc<ChaosAgent>>,
    payload: Result<Json<ContainerRequest>, JsonRejection>,
) -> ApiResponse {
    lifecycle(&agent, payload, Lifecycle::Start).await
}

/// `POST /docker/stop`
pub async fn stop_handler(
    Extension(agent): Extension<Arc<ChaosAgent>>,
    payload: Result<Json<ContainerRequest>, JsonRejection>,
) -> ApiResponse {
    lifecycle(&agent, payload, Lifecycle::Stop).await
}

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
    Start,
    Stop,
}

async fn lifecycle(
    agent: &ChaosAgent,
    payload: Result<Json<ContainerRequest>, JsonRejection>,
    action: Lifecycle,
) -> ApiResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_body(rejection),
    };
    if request.container_id.trim().is_empty() {
        return ApiResponse::error(StatusCode::BAD_REQUEST, "Container ID required");
    }

    let id = request.container_id.as_str();
    let (result, done) = match action {
        Lifecycle::Start => (agent.containers().start(id).await, "Container started"),
        Lifecycle::Stop => (agent.containers().stop(id).await, "Container stopped"),
    };

    match result {
        Ok(()) => {
            tracing::info!(container = id, "{}", done);
            ApiResponse::ok(done)
        }
        Err(e) => {
            ApiResponse::error(failure_status(&e), "Docker API Error").with_data(e.to_string())
        }
    }
}

/// `POST /docker/fault`
///
/// Runs the execution to its terminal event before answering. The
/// execution runs in its own task, so a client hanging up mid-hold still
/// gets the constraint restored.
pub async fn fault_handler(
    Extension(agent): Extension<Arc<ChaosAgent>>,
    payload: Result<Json<ContainerFaultRequest>, JsonRejection>,
) -> ApiResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_body(rejection),
    };

    let submission = FaultSubmission {
        container_id: Some(request.container_id),
        kind: request.fault_type,
        duration_secs: request.duration,
        ..Default::default()
    };

    let engine = Arc::clone(agent.engine());
    let execution = tokio::spawn(async move {
        let mut events: Vec<FaultEvent> = Vec::new();
        let outcome = engine.run(&submission, &mut events).await;
        (events, outcome)
    });

    match execution.await {
        Ok((events, Ok(()))) => {
            let message = events
                .iter()
                .rev()
                .find(|e| e.state == Phase::Injecting)
                .map(|e| e.msg.clone())
                .unwrap_or_else(|| "Fault applied".to_string());
            ApiResponse::ok(message).with_data(json!({ "events": events }))
        }
        Ok((events, Err(error))) => {
            let status = if error.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            ApiResponse::error(status, error.to_string()).with_data(json!({ "events": events }))
        }
        Err(e) => {
            tracing::error!("container fault task failed: {}", e);
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Fault execution aborted")
        }
    }
}
