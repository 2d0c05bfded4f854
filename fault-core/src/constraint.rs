//! Container resource constraints.
//!
//! The mapping from intent to constraint is fixed; these are the only
//! recognized container intents.
//!
//! | intent      | effect                                         |
//! |-------------|------------------------------------------------|
//! | `cpu_choke` | period 100000us, quota 10000us (10% of a core) |
//! | `mem_limit` | memory 64 MiB, swap unlimited (-1)             |
//! | `restore`   | quota unlimited (-1), memory 0 (runtime default) |

use fault_types::{FaultError, FaultKind};

/// CFS period used when throttling CPU.
pub const CPU_PERIOD_MICROS: i64 = 100_000;

/// CFS quota giving 10% of one core at [`CPU_PERIOD_MICROS`].
pub const CHOKED_CPU_QUOTA_MICROS: i64 = 10_000;

/// Memory cap for `mem_limit`.
pub const MEMORY_LIMIT_BYTES: i64 = 64 * 1024 * 1024;

/// Sentinel for "no limit" on quota and swap.
pub const UNLIMITED: i64 = -1;

/// Memory value meaning "runtime default", i.e. unconstrained.
pub const RUNTIME_DEFAULT_MEMORY: i64 = 0;

/// Fields sent in one container update call. `None` leaves a field untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceConstraint {
    /// CPU CFS period in microseconds.
    pub cpu_period_micros: Option<i64>,
    /// CPU CFS quota in microseconds.
    pub cpu_quota_micros: Option<i64>,
    /// Memory limit in bytes.
    pub memory_limit_bytes: Option<i64>,
    /// Memory + swap limit in bytes.
    pub memory_swap_limit_bytes: Option<i64>,
}

impl ResourceConstraint {
    /// Constraint for a container intent.
    ///
    /// # Errors
    ///
    /// `InvalidFaultKind` for any kind that is not a container intent.
    pub fn for_kind(kind: FaultKind) -> Result<Self, FaultError> {
        match kind {
            FaultKind::CpuChoke => Ok(Self::cpu_choke()),
            FaultKind::MemLimit => Ok(Self::mem_limit()),
            FaultKind::Restore => Ok(Self::restore()),
            other => Err(FaultError::InvalidFaultKind(format!(
                "{other} is not a container intent"
            ))),
        }
    }

    /// 10% of one core.
    pub fn cpu_choke() -> Self {
        Self {
            cpu_period_micros: Some(CPU_PERIOD_MICROS),
            cpu_quota_micros: Some(CHOKED_CPU_QUOTA_MICROS),
            ..Default::default()
        }
    }

    /// 64 MiB of memory, swap left unlimited.
    pub fn mem_limit() -> Self {
        Self {
            memory_limit_bytes: Some(MEMORY_LIMIT_BYTES),
            memory_swap_limit_bytes: Some(UNLIMITED),
            ..Default::default()
        }
    }

    /// Lift CPU and memory limits.
    pub fn restore() -> Self {
        Self {
            cpu_quota_micros: Some(UNLIMITED),
            memory_limit_bytes: Some(RUNTIME_DEFAULT_MEMORY),
            ..Default::default()
        }
    }

    /// Human summary reported once the constraint is in effect.
    pub fn summary(kind: FaultKind) -> &'static str {
        match kind {
            FaultKind::CpuChoke => "Container CPU throttled to 10%",
            FaultKind::MemLimit => "Container Memory limited to 64MB",
            FaultKind::Restore => "Container resources restored",
            _ => "Container constraint applied",
        }
    }

    /// Overlay the fields set in `self` onto `current`, the way the runtime
    /// applies a partial update.
    pub fn apply_to(&self, current: &mut ResourceConstraint) {
        if let Some(v) = self.cpu_period_micros {
            current.cpu_period_micros = Some(v);
        }
        if let Some(v) = self.cpu_quota_micros {
            current.cpu_quota_micros = Some(v);
        }
        if let Some(v) = self.memory_limit_bytes {
            current.memory_limit_bytes = Some(v);
        }
        if let Some(v) = self.memory_swap_limit_bytes {
            current.memory_swap_limit_bytes = Some(v);
        }
    }

    /// True when neither CPU quota nor memory limit constrains the container.
    pub fn is_unconstrained(&self) -> bool {
        matches!(self.cpu_quota_micros, None | Some(UNLIMITED))
            && matches!(self.memory_limit_bytes, None | Some(RUNTIME_DEFAULT_MEMORY))
    }
}
