//! Error types for chaosd.

use thiserror::Error;

/// Errors that can end a fault execution.
///
/// The payload is always the most specific cause available (tool output,
/// control API message, exit status), never a generic placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultError {
    /// Target or kind missing, malformed, or inconsistent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The fault kind (or container intent) is not recognized.
    #[error("unknown fault kind: {0}")]
    InvalidFaultKind(String),

    /// A required external tool or the control socket is unreachable.
    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    /// The apply call was rejected by the control API or shaping tool.
    #[error("setup failed: {0}")]
    SetupFailed(String),

    /// The workload could not be spawned or exited unsuccessfully.
    #[error("process failed: {0}")]
    ProcessFailed(String),

    /// The undo call failed; the host may be left degraded.
    #[error("cleanup failed: {0}")]
    CleanupFailed(String),
}

impl FaultError {
    /// Stable machine-readable name of the error class.
    pub fn code(&self) -> &'static str {
        match self {
            FaultError::InvalidRequest(_) => "invalid_request",
            FaultError::InvalidFaultKind(_) => "invalid_fault_kind",
            FaultError::DriverUnavailable(_) => "driver_unavailable",
            FaultError::SetupFailed(_) => "setup_failed",
            FaultError::ProcessFailed(_) => "process_failed",
            FaultError::CleanupFailed(_) => "cleanup_failed",
        }
    }

    /// True when the caller sent something unusable (no side effect happened).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FaultError::InvalidRequest(_) | FaultError::InvalidFaultKind(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_keeps_cause() {
        let err = FaultError::SetupFailed("tc failed: RTNETLINK answers: File exists".into());
        assert_eq!(
            err.to_string(),
            "setup failed: tc failed: RTNETLINK answers: File exists"
        );
    }

    #[test]
    fn client_errors_are_request_problems_only() {
        assert!(FaultError::InvalidRequest("x".into()).is_client_error());
        assert!(FaultError::InvalidFaultKind("x".into()).is_client_error());
        assert!(!FaultError::CleanupFailed("x".into()).is_client_error());
        assert!(!FaultError::DriverUnavailable("x".into()).is_client_error());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FaultError>();
    }
}
