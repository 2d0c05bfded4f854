//! Error types for the chaosd agent.

use fault_engine::DriverError;

/// Main error type for agent startup and serving.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A control facility could not be set up.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Logging could not be initialised.
    #[error("logging error: {0}")]
    Logging(String),
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
