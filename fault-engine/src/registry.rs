//! Registry of executions that have not reached a terminal state.

use dashmap::DashMap;
use fault_types::unix_millis;
use serde::Serialize;
use uuid::Uuid;

/// Snapshot of one in-flight execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveFault {
    /// Execution id.
    pub id: Uuid,
    /// Fault kind (`cpu`, `network_delay`, `cpu_choke`, ...).
    pub kind: String,
    /// Target container id, or `None` for the host.
    pub target: Option<String>,
    /// Current lifecycle state label.
    pub state: &'static str,
    /// When the execution was accepted (unix milliseconds).
    pub started_at: u64,
}

/// Concurrent map of in-flight executions.
#[derive(Debug, Default)]
pub struct ActiveFaults {
    faults: DashMap<Uuid, ActiveFault>,
}

impl ActiveFaults {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new execution.
    pub fn register(&self, id: Uuid, kind: &str, target: Option<String>, state: &'static str) {
        self.faults.insert(
            id,
            ActiveFault {
                id,
                kind: kind.to_string(),
                target,
                state,
                started_at: unix_millis(),
            },
        );
    }

    /// Update the state label of a tracked execution.
    pub fn update(&self, id: &Uuid, state: &'static str) {
        if let Some(mut entry) = self.faults.get_mut(id) {
            entry.state = state;
        }
    }

    /// Stop tracking an execution. Returns whether it was tracked.
    pub fn remove(&self, id: &Uuid) -> bool {
        self.faults.remove(id).is_some()
    }

    /// Whether an execution is still tracked.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.faults.contains_key(id)
    }

    /// Number of in-flight executions.
    pub fn len(&self) -> usize {
        self.faults.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// All in-flight executions, oldest first.
    pub fn snapshot(&self) -> Vec<ActiveFault> {
        let mut all: Vec<_> = self.faults.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|f| (f.started_at, f.id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_update_remove() {
        let registry = ActiveFaults::new();
        let id = Uuid::new_v4();

        registry.register(id, "cpu", None, "pending");
        assert_eq!(registry.len(), 1);

        registry.update(&id, "streaming");
        assert_eq!(registry.snapshot()[0].state, "streaming");

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_serializes_target() {
        let registry = ActiveFaults::new();
        let id = Uuid::new_v4();
        registry.register(id, "cpu_choke", Some("abc123".into()), "injecting");

        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json[0]["target"], "abc123");
        assert_eq!(json[0]["kind"], "cpu_choke");
    }
}
