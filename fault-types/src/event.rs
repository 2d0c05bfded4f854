//! Lifecycle events streamed to the caller.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Phase tag carried by every event (`state` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Request accepted, setup about to run.
    Start,
    /// Setup applied, the fault is in effect.
    Injecting,
    /// One line of workload output.
    Log,
    /// Undo action running.
    Cleaning,
    /// Terminal: finished successfully.
    Completed,
    /// Terminal: finished with an error.
    Error,
}

impl Phase {
    /// Completed and Error end the feed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Injecting => "injecting",
            Phase::Log => "log",
            Phase::Cleaning => "cleaning",
            Phase::Completed => "completed",
            Phase::Error => "error",
        }
    }
}

/// One entry of the append-only event feed.
///
/// Serializes as `{"state": "...", "msg": "...", "timestamp": <unix millis>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    /// Phase of the execution that produced this event.
    pub state: Phase,
    /// Human-readable message or a verbatim output line.
    pub msg: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl FaultEvent {
    /// Create an event stamped with the current time.
    pub fn new(state: Phase, msg: impl Into<String>) -> Self {
        Self {
            state,
            msg: msg.into(),
            timestamp: unix_millis(),
        }
    }

    /// True for `completed` and `error` events.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
