//! JSON response envelope shared by the container API.
//!
//! Success: `{"message": "...", "data": ...}`. Failure: `{"message": "error",
//! "error": "...", "data": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    /// Outcome message; `"error"` on failure.
    pub message: String,
    /// Failure summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiResponse {
    /// 200 with a message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
            data: None,
            status: StatusCode::OK,
        }
    }

    /// Failure with a status code and summary.
    pub fn error(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            message: "error".to_string(),
            error: Some(error.into()),
            data: None,
            status,
        }
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => self.data = Some(value),
            Err(e) => tracing::warn!("failed to serialize response data: {}", e),
        }
        self
    }

    /// HTTP status this envelope is sent with.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_omits_error() {
        let json = serde_json::to_value(ApiResponse::ok("Container started")).unwrap();
        assert_eq!(json, json!({"message": "Container started"}));
    }

    #[test]
    fn failure_uses_error_message() {
        let response = ApiResponse::error(StatusCode::BAD_REQUEST, "Container ID required")
            .with_data("details");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            json!({"message": "error", "error": "Container ID required", "data": "details"})
        );
    }
}
