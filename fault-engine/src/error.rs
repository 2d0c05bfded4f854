//! Error types for fault drivers.

use fault_types::FaultError;

/// Errors returned by the container, traffic and process drivers.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Docker API error.
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// A required tool or socket is missing.
    #[error("{0}")]
    Unavailable(String),

    /// An external command ran and reported failure.
    #[error("{program} failed: {output}")]
    Command {
        /// Program that failed.
        program: String,
        /// Combined stdout/stderr of the program.
        output: String,
    },

    /// The OS refused to spawn a process.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that could not be started.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The kind has no meaning for this driver.
    #[error("{0} is not a container intent")]
    InvalidFaultKind(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Classify a failure that happened while applying a fault.
    pub fn into_setup_error(self) -> FaultError {
        let message = self.to_string();
        match self {
            DriverError::Unavailable(_) => FaultError::DriverUnavailable(message),
            DriverError::Docker(bollard::errors::Error::DockerResponseServerError { .. }) => {
                FaultError::SetupFailed(message)
            }
            // Anything else from bollard means the socket could not be reached
            DriverError::Docker(_) => FaultError::DriverUnavailable(message),
            DriverError::Spawn { .. } => FaultError::ProcessFailed(message),
            DriverError::InvalidFaultKind(kind) => FaultError::InvalidFaultKind(kind),
            DriverError::Command { .. } | DriverError::Io(_) => FaultError::SetupFailed(message),
        }
    }

    /// Classify a failure that happened while undoing a fault.
    pub fn into_cleanup_error(self) -> FaultError {
        FaultError::CleanupFailed(self.to_string())
    }

    /// Map a spawn failure, treating a missing executable as an unavailable tool.
    pub fn spawn(program: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            DriverError::Unavailable(format!("{program} command not found"))
        } else {
            DriverError::Spawn {
                program: program.to_string(),
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_keeps_tool_output() {
        let err = DriverError::Command {
            program: "tc".into(),
            output: "RTNETLINK answers: Operation not permitted".into(),
        };
        assert_eq!(
            err.into_setup_error(),
            FaultError::SetupFailed("tc failed: RTNETLINK answers: Operation not permitted".into())
        );
    }

    #[test]
    fn docker_rejection_is_setup_failure() {
        let err = DriverError::Docker(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc123".into(),
        });
        assert!(matches!(err.into_setup_error(), FaultError::SetupFailed(msg) if msg.contains("abc123")));
    }

    #[test]
    fn missing_executable_is_unavailable() {
        let err = DriverError::spawn(
            "stress-ng",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(
            err.into_setup_error(),
            FaultError::DriverUnavailable("stress-ng command not found".into())
        );
    }

    #[test]
    fn other_spawn_errors_are_process_failures() {
        let err = DriverError::spawn(
            "fio",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err.into_setup_error(), FaultError::ProcessFailed(_)));
    }

    #[test]
    fn cleanup_errors_are_cleanup_failures() {
        let err = DriverError::Unavailable("docker socket unreachable".into());
        assert_eq!(
            err.into_cleanup_error(),
            FaultError::CleanupFailed("docker socket unreachable".into())
        );
    }
}
