//! Tracing subscriber setup.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::AgentError;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable that overrides every other filter source.
pub const LOG_ENV: &str = "CHAOSD_LOG";

/// Filter directive: `CHAOSD_LOG`, then `RUST_LOG`, then the configured one.
pub fn resolve_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_ENV) {
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!(
                "invalid {} directive ({}); falling back to RUST_LOG or config",
                LOG_ENV, err
            ),
        }
    }

    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<(), AgentError> {
    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer().with_target(false).json().boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(resolve_filter(config))
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AgentError::Logging(e.to_string()))?;

    tracing::debug!(format = ?config.format, "tracing initialised");
    Ok(())
}
