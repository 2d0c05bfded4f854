//! Configuration loading for chaosd.
//!
//! Configuration is loaded from a TOML file (default: `chaosd.toml`). Every
//! section and field is optional; a missing file means all defaults.

use fault_core::WorkloadPrograms;
use fault_engine::EngineSettings;
use fault_types::RequestDefaults;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for chaosd.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Docker daemon connection.
    #[serde(default)]
    pub docker: DockerConfig,
    /// Host network fault settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Stress workload settings.
    #[serde(default)]
    pub workloads: WorkloadConfig,
    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Shutdown behaviour.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Docker daemon connection.
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    /// Unix socket of the daemon (default: /var/run/docker.sock).
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_docker_timeout")]
    pub timeout_secs: u64,
}

/// Host network fault settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Interface shaped when a request names none (default: eth0).
    #[serde(default = "default_interface")]
    pub default_interface: String,
    /// Host pinged to visualize a network fault (default: 1.1.1.1).
    #[serde(default = "default_probe_host")]
    pub probe_host: String,
    /// Traffic-control binary (default: tc).
    #[serde(default = "default_tc_binary")]
    pub tc_binary: String,
}

/// Stress workload settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadConfig {
    /// CPU/memory stressor (default: stress-ng).
    #[serde(default = "default_stress_binary")]
    pub stress_binary: String,
    /// Disk stressor (default: fio).
    #[serde(default = "default_fio_binary")]
    pub fio_binary: String,
    /// Network probe (default: ping).
    #[serde(default = "default_ping_binary")]
    pub ping_binary: String,
    /// Directory for disk-stress scratch files (default: system temp dir).
    #[serde(default = "std::env::temp_dir")]
    pub scratch_dir: PathBuf,
    /// Duration used when a request gives none or a non-positive one (default: 10).
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for terminals.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Logging output.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Output format (default: pretty).
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directive used when neither `CHAOSD_LOG` nor `RUST_LOG` is set
    /// (default: info).
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Shutdown behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// How long to wait for running faults to clean up (default: 30).
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_socket_path() -> String {
    "/var/run/docker.sock".to_string()
}

fn default_docker_timeout() -> u64 {
    30
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_probe_host() -> String {
    "1.1.1.1".to_string()
}

fn default_tc_binary() -> String {
    "tc".to_string()
}

fn default_stress_binary() -> String {
    "stress-ng".to_string()
}

fn default_fio_binary() -> String {
    "fio".to_string()
}

fn default_ping_binary() -> String {
    "ping".to_string()
}

fn default_duration_secs() -> u64 {
    10
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_drain_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            timeout_secs: default_docker_timeout(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_interface: default_interface(),
            probe_host: default_probe_host(),
            tc_binary: default_tc_binary(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            stress_binary: default_stress_binary(),
            fio_binary: default_fio_binary(),
            ping_binary: default_ping_binary(),
            scratch_dir: std::env::temp_dir(),
            default_duration_secs: default_duration_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workloads.default_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "workloads.default_duration_secs must be positive".into(),
            ));
        }
        if self.network.default_interface.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "network.default_interface must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            defaults: RequestDefaults {
                duration: Duration::from_secs(self.workloads.default_duration_secs),
                interface: self.network.default_interface.clone(),
            },
            programs: WorkloadPrograms {
                stress: self.workloads.stress_binary.clone(),
                fio: self.workloads.fio_binary.clone(),
                ping: self.workloads.ping_binary.clone(),
            },
            probe_host: self.network.probe_host.clone(),
            scratch_dir: self.workloads.scratch_dir.clone(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
