//! Fault requests: the raw submission and its validated form.

use crate::error::FaultError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Latency applied when a delay fault names no value.
pub const DEFAULT_DELAY: &str = "200ms";

/// Loss rate applied when a loss fault names no value.
pub const DEFAULT_LOSS: &str = "10%";

/// What a fault is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Target {
    /// A container managed by the local runtime.
    Container(String),
    /// The machine the agent runs on.
    Host,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Container(id) => write!(f, "container {id}"),
            Target::Host => f.write_str("host"),
        }
    }
}

/// Which driver family executes a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultFamily {
    /// Resource constraint applied through the container control API.
    Container,
    /// Stress workload run as a local process.
    Process,
    /// Traffic-shaping rule on a host interface.
    Network,
}

/// Every recognized fault kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Throttle a container to 10% of one core.
    CpuChoke,
    /// Cap a container's memory at 64 MiB.
    MemLimit,
    /// Lift any CPU/memory constraint from a container.
    Restore,
    /// Saturate every host CPU.
    CpuStress,
    /// Consume most of the host's memory.
    MemStress,
    /// Hammer a scratch file with random I/O.
    DiskStress,
    /// Add fixed latency on an interface.
    NetworkDelay,
    /// Drop a percentage of packets on an interface.
    NetworkLoss,
}

impl FaultKind {
    /// Parse a kind name plus the optional network subtype.
    pub fn parse(kind: &str, subtype: Option<&str>) -> Result<Self, FaultError> {
        match kind.trim() {
            "cpu_choke" => Ok(FaultKind::CpuChoke),
            "mem_limit" => Ok(FaultKind::MemLimit),
            "restore" => Ok(FaultKind::Restore),
            "cpu" | "cpu_stress" => Ok(FaultKind::CpuStress),
            "memory" | "mem_stress" | "memory_stress" => Ok(FaultKind::MemStress),
            "disk" | "disk_stress" => Ok(FaultKind::DiskStress),
            "network" => match subtype.map(str::trim).unwrap_or("") {
                "" | "delay" | "latency" => Ok(FaultKind::NetworkDelay),
                "loss" => Ok(FaultKind::NetworkLoss),
                other => Err(FaultError::InvalidFaultKind(format!("network/{other}"))),
            },
            "network_delay" => Ok(FaultKind::NetworkDelay),
            "network_loss" => Ok(FaultKind::NetworkLoss),
            other => Err(FaultError::InvalidFaultKind(other.to_string())),
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::CpuChoke => "cpu_choke",
            FaultKind::MemLimit => "mem_limit",
            FaultKind::Restore => "restore",
            FaultKind::CpuStress => "cpu",
            FaultKind::MemStress => "memory",
            FaultKind::DiskStress => "disk",
            FaultKind::NetworkDelay => "network_delay",
            FaultKind::NetworkLoss => "network_loss",
        }
    }

    /// Driver family responsible for this kind.
    pub fn family(&self) -> FaultFamily {
        match self {
            FaultKind::CpuChoke | FaultKind::MemLimit | FaultKind::Restore => {
                FaultFamily::Container
            }
            FaultKind::CpuStress | FaultKind::MemStress | FaultKind::DiskStress => {
                FaultFamily::Process
            }
            FaultKind::NetworkDelay | FaultKind::NetworkLoss => FaultFamily::Network,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed shaping parameters for a network fault.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkParams {
    /// Interface the root rule is installed on.
    pub interface: String,
    /// Fixed delay in milliseconds.
    pub delay_ms: Option<u64>,
    /// Jitter in milliseconds (only with a delay).
    pub jitter_ms: Option<u64>,
    /// Packet loss percentage (0.0–100.0).
    pub loss_percent: Option<f32>,
}

/// Kind-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultParams {
    /// Container constraint. With a hold the constraint is undone after it.
    Constraint {
        /// How long to keep the constraint before restoring (None = sticky).
        hold: Option<Duration>,
    },
    /// Host stress workload.
    Stress {
        /// Workload run time.
        duration: Duration,
    },
    /// Host traffic shaping.
    Network {
        /// Rule parameters.
        shaping: NetworkParams,
        /// How long the rule stays installed.
        duration: Duration,
        /// Run a probe process to produce observable output.
        visualize: bool,
    },
}

/// Defaults applied while validating a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDefaults {
    /// Used when no positive duration is given.
    pub duration: Duration,
    /// Used when a network fault names no interface.
    pub interface: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            interface: "eth0".into(),
        }
    }
}

/// A fault description as received from a caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultSubmission {
    /// Container to target; absent for host faults.
    #[serde(default)]
    pub container_id: Option<String>,
    /// Kind name (`cpu_choke`, `cpu`, `network`, ...).
    #[serde(default)]
    pub kind: String,
    /// Network subtype: `delay` or `loss`.
    #[serde(default)]
    pub subtype: Option<String>,
    /// Subtype value, e.g. `200ms` or `10%`.
    #[serde(default)]
    pub value: Option<String>,
    /// Delay jitter, e.g. `20ms`.
    #[serde(default)]
    pub jitter: Option<String>,
    /// Network interface.
    #[serde(default)]
    pub interface: Option<String>,
    /// Duration in seconds; non-positive means "use the default".
    #[serde(default)]
    pub duration_secs: Option<i64>,
    /// Run a probe alongside a network fault (default true).
    #[serde(default)]
    pub visualize: Option<bool>,
}

/// A validated, immutable fault request.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRequest {
    /// Where the fault applies.
    pub target: Target,
    /// What the fault does.
    pub kind: FaultKind,
    /// How it is parameterized.
    pub params: FaultParams,
}

impl FaultRequest {
    /// Whether applying this fault leaves something that must be undone.
    pub fn has_undo(&self) -> bool {
        match &self.params {
            FaultParams::Constraint { hold } => hold.is_some() && self.kind != FaultKind::Restore,
            FaultParams::Stress { .. } => false,
            FaultParams::Network { .. } => true,
        }
    }

    /// Configured run time of the fault, if it has one.
    pub fn duration(&self) -> Option<Duration> {
        match &self.params {
            FaultParams::Constraint { hold } => *hold,
            FaultParams::Stress { duration } | FaultParams::Network { duration, .. } => {
                Some(*duration)
            }
        }
    }
}

impl FaultSubmission {
    /// Validate into a [`FaultRequest`], filling in defaults.
    ///
    /// # Errors
    ///
    /// `InvalidFaultKind` for unknown kinds, `InvalidRequest` for a missing
    /// kind, a missing or misplaced container id, or unparseable values.
    pub fn validate(&self, defaults: &RequestDefaults) -> Result<FaultRequest, FaultError> {
        if self.kind.trim().is_empty() {
            return Err(FaultError::InvalidRequest("missing fault kind".into()));
        }
        let kind = FaultKind::parse(&self.kind, self.subtype.as_deref())?;

        let container = non_empty(self.container_id.as_deref());
        let target = match (kind.family(), container) {
            (FaultFamily::Container, Some(id)) => Target::Container(id.to_string()),
            (FaultFamily::Container, None) => {
                return Err(FaultError::InvalidRequest(format!(
                    "container_id is required for {kind}"
                )))
            }
            (_, Some(id)) => {
                return Err(FaultError::InvalidRequest(format!(
                    "{kind} is a host fault and cannot target container {id}"
                )))
            }
            (_, None) => Target::Host,
        };

        let requested = self
            .duration_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64));

        let params = match kind.family() {
            FaultFamily::Container => FaultParams::Constraint {
                hold: if kind == FaultKind::Restore {
                    None
                } else {
                    requested
                },
            },
            FaultFamily::Process => FaultParams::Stress {
                duration: requested.unwrap_or(defaults.duration),
            },
            FaultFamily::Network => FaultParams::Network {
                shaping: self.network_params(kind, defaults)?,
                duration: requested.unwrap_or(defaults.duration),
                visualize: self.visualize.unwrap_or(true),
            },
        };

        Ok(FaultRequest {
            target,
            kind,
            params,
        })
    }

    fn network_params(
        &self,
        kind: FaultKind,
        defaults: &RequestDefaults,
    ) -> Result<NetworkParams, FaultError> {
        let interface = non_empty(self.interface.as_deref())
            .unwrap_or(&defaults.interface)
            .to_string();
        let value = non_empty(self.value.as_deref());

        let mut params = NetworkParams {
            interface,
            delay_ms: None,
            jitter_ms: None,
            loss_percent: None,
        };

        if kind == FaultKind::NetworkLoss {
            params.loss_percent = Some(parse_percent(value.unwrap_or(DEFAULT_LOSS))?);
        } else {
            params.delay_ms = Some(parse_millis(value.unwrap_or(DEFAULT_DELAY))?);
            if let Some(jitter) = non_empty(self.jitter.as_deref()) {
                params.jitter_ms = Some(parse_millis(jitter)?);
            }
        }

        Ok(params)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse `200ms`, `1s`, `500us` or a bare millisecond count.
///
/// netem rules are built in whole milliseconds, so microsecond values round
/// up: `500us` becomes 1 ms and never silently disappears.
fn parse_millis(input: &str) -> Result<u64, FaultError> {
    let invalid = || FaultError::InvalidRequest(format!("invalid latency value: {input}"));
    let parse = |number: &str| -> Result<f64, FaultError> {
        let value: f64 = number.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        Ok(value)
    };

    if let Some(us) = input.strip_suffix("us") {
        Ok((parse(us)? / 1000.0).ceil() as u64)
    } else if let Some(ms) = input.strip_suffix("ms") {
        Ok(parse(ms)?.round() as u64)
    } else if let Some(s) = input.strip_suffix('s') {
        Ok((parse(s)? * 1000.0).round() as u64)
    } else {
        Ok(parse(input)?.round() as u64)
    }
}

/// Parse `10%` or a bare percentage within 0..=100.
fn parse_percent(input: &str) -> Result<f32, FaultError> {
    let number = input.strip_suffix('%').unwrap_or(input).trim();
    match number.parse::<f32>() {
        Ok(value) if (0.0..=100.0).contains(&value) => Ok(value),
        _ => Err(FaultError::InvalidRequest(format!(
            "invalid loss value: {input}"
        ))),
    }
}
