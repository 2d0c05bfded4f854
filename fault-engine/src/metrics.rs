//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters since startup.
///
/// Thread-safe via `AtomicU64`, no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Executions accepted (a start event was emitted).
    pub started_total: AtomicU64,
    /// Executions that ended in `completed`.
    pub completed_total: AtomicU64,
    /// Executions that ended in `error`, including rejected requests.
    pub failed_total: AtomicU64,
    /// Undo operations that failed and left a fault in place.
    pub cleanup_failures_total: AtomicU64,
    /// Workload output lines relayed as log events.
    pub log_lines_total: AtomicU64,
}

impl EngineMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
