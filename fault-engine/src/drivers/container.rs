//! Container resource control via the bollard Docker API.

use crate::error::DriverError;
use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, StartContainerOptions, UpdateContainerOptions,
};
use bollard::Docker;
use fault_core::ResourceConstraint;
use fault_types::FaultKind;
use serde::Serialize;
use std::sync::Arc;

/// Acknowledgement of a successful apply or clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// What is now in effect.
    pub summary: String,
}

/// One row of the container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    /// Short (12 character) container id.
    pub id: String,
    /// Primary name without the leading slash.
    pub name: String,
    /// Lifecycle state (`running`, `exited`, ...).
    pub state: String,
    /// Human status text (`Up 2 hours`).
    pub status: String,
}

/// Container runtime control API.
///
/// Implementations talk to a local, trusted control channel.
#[async_trait]
pub trait ContainerControl: Send + Sync {
    /// Apply a resource constraint to one container.
    async fn update(&self, id: &str, constraint: &ResourceConstraint) -> Result<(), DriverError>;

    /// List all containers, running or not.
    async fn list(&self) -> Result<Vec<ContainerSummary>, DriverError>;

    /// Lifecycle state of one container.
    async fn state(&self, id: &str) -> Result<String, DriverError>;

    /// Start a container. Already running is success.
    async fn start(&self, id: &str) -> Result<(), DriverError>;

    /// Stop a container. Already stopped is success.
    async fn stop(&self, id: &str) -> Result<(), DriverError>;

    /// Check that the control channel answers.
    async fn ping(&self) -> Result<(), DriverError>;
}

/// [`ContainerControl`] backed by one long-lived bollard client.
#[derive(Debug, Clone)]
pub struct DockerControl {
    docker: Docker,
}

impl DockerControl {
    /// Connect to the Docker daemon over a unix socket.
    ///
    /// The client is created once and shared for the life of the process.
    pub fn connect(socket_path: &str, timeout_secs: u64) -> Result<Self, DriverError> {
        let docker =
            Docker::connect_with_unix(socket_path, timeout_secs, bollard::API_DEFAULT_VERSION)?;
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerControl for DockerControl {
    async fn update(&self, id: &str, constraint: &ResourceConstraint) -> Result<(), DriverError> {
        let options = UpdateContainerOptions::<String> {
            cpu_period: constraint.cpu_period_micros,
            cpu_quota: constraint.cpu_quota_micros,
            memory: constraint.memory_limit_bytes,
            memory_swap: constraint.memory_swap_limit_bytes,
            ..Default::default()
        };
        self.docker.update_container(id, options).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ContainerSummary>, DriverError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: short_id(c.id.as_deref().unwrap_or_default()),
                name: primary_name(c.names.as_deref().unwrap_or_default()),
                state: c.state.unwrap_or_default(),
                status: c.status.unwrap_or_default(),
            })
            .collect())
    }

    async fn state(&self, id: &str) -> Result<String, DriverError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        Ok(inspect
            .state
            .and_then(|s| s.status)
            .map(|status| status.to_string())
            .unwrap_or_else(|| "unknown".to_string()))
    }

    async fn start(&self, id: &str) -> Result<(), DriverError> {
        let result = self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await;
        not_modified_is_ok(result)
    }

    async fn stop(&self, id: &str) -> Result<(), DriverError> {
        not_modified_is_ok(self.docker.stop_container(id, None).await)
    }

    async fn ping(&self) -> Result<(), DriverError> {
        self.docker.ping().await?;
        Ok(())
    }
}

/// Docker answers 304 when the container is already in the requested state.
fn not_modified_is_ok(result: Result<(), bollard::errors::Error>) -> Result<(), DriverError> {
    match result {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304, ..
        }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

fn primary_name(names: &[String]) -> String {
    names
        .first()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Resource-control driver: one update call per `apply` or `clear`.
///
/// No retries; a transport failure is returned to the caller as-is.
#[derive(Clone)]
pub struct ResourceDriver {
    control: Arc<dyn ContainerControl>,
}

impl ResourceDriver {
    /// Create a driver over a control API.
    pub fn new(control: Arc<dyn ContainerControl>) -> Self {
        Self { control }
    }

    /// Apply the constraint for a container intent.
    ///
    /// Kinds that are not container intents fail with
    /// [`DriverError::InvalidFaultKind`] without calling the API.
    pub async fn apply(&self, container: &str, kind: FaultKind) -> Result<Ack, DriverError> {
        let Ok(constraint) = ResourceConstraint::for_kind(kind) else {
            return Err(DriverError::InvalidFaultKind(kind.to_string()));
        };
        self.control.update(container, &constraint).await?;
        tracing::info!(container, kind = %kind, "constraint applied");

        Ok(Ack {
            summary: ResourceConstraint::summary(kind).to_string(),
        })
    }

    /// Lift every constraint from a container.
    pub async fn clear(&self, container: &str) -> Result<Ack, DriverError> {
        self.control
            .update(container, &ResourceConstraint::restore())
            .await?;
        tracing::info!(container, "constraint cleared");

        Ok(Ack {
            summary: ResourceConstraint::summary(FaultKind::Restore).to_string(),
        })
    }

    /// The underlying control API.
    pub fn control(&self) -> &Arc<dyn ContainerControl> {
        &self.control
    }
}

impl std::fmt::Debug for ResourceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDriver").finish_non_exhaustive()
    }
}
