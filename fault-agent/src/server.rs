//! Agent state shared by every HTTP handler.
//!
//! `ChaosAgent` owns the configuration and the single fault engine (and
//! through it the one long-lived Docker client) for the life of the process.

use crate::config::Config;
use crate::error::Result;
use fault_engine::drivers::{ContainerControl, DockerControl, SystemLauncher, TcCommand};
use fault_engine::FaultEngine;
use std::sync::Arc;
use std::time::Instant;

/// Main agent state.
pub struct ChaosAgent {
    config: Config,
    engine: Arc<FaultEngine>,
    started: Instant,
}

impl std::fmt::Debug for ChaosAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosAgent")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl ChaosAgent {
    /// Create an agent around an existing engine.
    pub fn new(config: Config, engine: Arc<FaultEngine>) -> Self {
        Self {
            config,
            engine,
            started: Instant::now(),
        }
    }

    /// Build the production engine: Docker socket, `tc` binary, host processes.
    ///
    /// Connecting only builds the client; nothing is sent to the daemon yet.
    pub fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let docker = DockerControl::connect(&config.docker.socket_path, config.docker.timeout_secs)?;
        let engine = FaultEngine::new(
            config.engine_settings(),
            Arc::new(docker),
            Arc::new(TcCommand::new(config.network.tc_binary.clone())),
            Arc::new(SystemLauncher::new()),
        );
        Ok(Self::new(config, Arc::new(engine)))
    }

    /// Get the agent configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the fault engine.
    pub fn engine(&self) -> &Arc<FaultEngine> {
        &self.engine
    }

    /// Container control API used by the `/docker` routes.
    pub fn containers(&self) -> &Arc<dyn ContainerControl> {
        self.engine.containers()
    }

    /// Seconds since the agent was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Check that the Docker daemon answers. Failure is logged, not fatal:
    /// host faults still work without it.
    pub async fn check_docker(&self) {
        match self.containers().ping().await {
            Ok(()) => tracing::info!(socket = %self.config.docker.socket_path, "docker daemon reachable"),
            Err(e) => tracing::warn!(
                socket = %self.config.docker.socket_path,
                "docker daemon unreachable, container faults will fail: {}",
                e
            ),
        }
    }
}

/// Whether the effective user is root. `tc` and the Docker socket normally
/// need it.
#[cfg(unix)]
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Whether the effective user is root. Always true off unix.
#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    true
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    /// Effective uid as the kernel reports it (second field of `Uid:`).
    fn status_euid() -> u32 {
        let status = std::fs::read_to_string("/proc/self/status").unwrap();
        let uid_line = status.lines().find(|l| l.starts_with("Uid:")).unwrap();
        uid_line.split_whitespace().nth(2).unwrap().parse().unwrap()
    }

    #[test]
    fn root_check_follows_effective_uid() {
        assert_eq!(running_as_root(), status_euid() == 0);
    }
}
