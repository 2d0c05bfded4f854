//! Fault execution state machine.
//!
//! A pure, side-effect-free state machine for one fault execution. It takes
//! events as input and produces a new state plus a list of actions. The
//! engine performs the actual I/O (container updates, `tc`, processes) and
//! feeds the outcomes back in as events.
//!
//! ```text
//! Pending -> Preparing -> Injecting -> (Streaming)* -> Cleaning? -> Completed | Error
//! ```
//!
//! Every path ends in exactly one `Completed` or `Error` emission, and
//! terminal states ignore all further events.

use fault_types::{FaultError, Phase};

/// Message emitted with the `completed` event.
pub const COMPLETED_MESSAGE: &str = "Fault injection finished";

/// Execution state - NO I/O, just transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    /// Created, request not yet validated.
    Pending,
    /// Validated, kind-specific setup in progress.
    Preparing {
        /// Message announcing the undo action, if the fault has one.
        undo: Option<String>,
    },
    /// Setup applied; waiting for the fault to run its course.
    Injecting {
        /// Message announcing the undo action, if the fault has one.
        undo: Option<String>,
    },
    /// Setup applied and live output is being relayed.
    Streaming {
        /// Message announcing the undo action, if the fault has one.
        undo: Option<String>,
    },
    /// Undo action in progress.
    Cleaning {
        /// Earlier failure to report once cleanup is done.
        cause: Option<FaultError>,
    },
    /// Terminal: success.
    Completed,
    /// Terminal: failure.
    Failed {
        /// Most recent concrete cause.
        error: FaultError,
    },
}

impl ExecutionState {
    /// Create a new state machine in the Pending state.
    pub fn new() -> Self {
        Self::Pending
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function. The caller performs the returned actions
    /// in order.
    pub fn on_event(self, event: ExecutionEvent) -> (Self, Vec<Action>) {
        match (self, event) {
            // Terminal states absorb everything
            (state @ (Self::Completed | Self::Failed { .. }), _) => (state, vec![]),

            // From Pending
            (Self::Pending, ExecutionEvent::Accepted { undo, message }) => (
                Self::Preparing { undo },
                vec![Action::emit(Phase::Start, message)],
            ),
            (Self::Pending, ExecutionEvent::Rejected { error }) => fail(error),

            // From Preparing
            (Self::Preparing { undo }, ExecutionEvent::SetupApplied { live_output, message }) => {
                let emit = Action::emit(Phase::Injecting, message);
                if live_output {
                    (Self::Streaming { undo }, vec![emit, Action::StreamOutput])
                } else {
                    (Self::Injecting { undo }, vec![emit, Action::AwaitCompletion])
                }
            }
            (
                Self::Preparing { undo },
                ExecutionEvent::SetupFailed {
                    error,
                    partially_applied,
                },
            ) => match undo {
                Some(message) if partially_applied => clean(message, Some(error)),
                _ => fail(error),
            },

            // Streaming output never changes the logical state
            (Self::Streaming { undo }, ExecutionEvent::OutputLine { line }) => (
                Self::Streaming { undo },
                vec![Action::emit(Phase::Log, line)],
            ),

            // Workload finished (process exit or duration expiry)
            (
                Self::Injecting { undo } | Self::Streaming { undo },
                ExecutionEvent::WorkloadFinished { outcome },
            ) => match (undo, outcome) {
                (Some(message), outcome) => clean(message, outcome.err()),
                (None, Ok(())) => complete(),
                (None, Err(error)) => fail(error),
            },

            // From Cleaning: a single attempt, never retried
            (Self::Cleaning { cause }, ExecutionEvent::CleanupFinished { outcome }) => {
                match (outcome, cause) {
                    (Err(error), _) => fail(error),
                    (Ok(()), Some(error)) => fail(error),
                    (Ok(()), None) => complete(),
                }
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// True once `Completed` or `Error` has been emitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// True while the undo action must run.
    pub fn is_cleaning(&self) -> bool {
        matches!(self, Self::Cleaning { .. })
    }

    /// Short lowercase name for status reporting.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing { .. } => "preparing",
            Self::Injecting { .. } => "injecting",
            Self::Streaming { .. } => "streaming",
            Self::Cleaning { .. } => "cleaning",
            Self::Completed => "completed",
            Self::Failed { .. } => "error",
        }
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

fn fail(error: FaultError) -> (ExecutionState, Vec<Action>) {
    let message = error.to_string();
    (
        ExecutionState::Failed { error },
        vec![Action::emit(Phase::Error, message)],
    )
}

fn complete() -> (ExecutionState, Vec<Action>) {
    (
        ExecutionState::Completed,
        vec![Action::emit(Phase::Completed, COMPLETED_MESSAGE)],
    )
}

fn clean(message: String, cause: Option<FaultError>) -> (ExecutionState, Vec<Action>) {
    (
        ExecutionState::Cleaning { cause },
        vec![Action::emit(Phase::Cleaning, message), Action::RunCleanup],
    )
}

/// Events that can occur during an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// Request validated.
    Accepted {
        /// Cleaning message if the fault has an undo action.
        undo: Option<String>,
        /// Start message.
        message: String,
    },
    /// Request failed validation.
    Rejected {
        /// Validation error.
        error: FaultError,
    },
    /// Kind-specific setup succeeded.
    SetupApplied {
        /// Whether a live output source is attached.
        live_output: bool,
        /// Injecting message.
        message: String,
    },
    /// Kind-specific setup failed.
    SetupFailed {
        /// Driver error.
        error: FaultError,
        /// Whether a side effect was applied before the failure.
        partially_applied: bool,
    },
    /// A line from the multiplexed workload output.
    OutputLine {
        /// The line, without its terminator.
        line: String,
    },
    /// The workload exited or the configured duration elapsed.
    WorkloadFinished {
        /// Failure cause, if any.
        outcome: Result<(), FaultError>,
    },
    /// The undo call returned.
    CleanupFinished {
        /// Failure cause, if any.
        outcome: Result<(), FaultError>,
    },
}

/// Actions to be executed by the engine.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Append an event to the feed.
    Emit {
        /// Event phase.
        phase: Phase,
        /// Event message.
        message: String,
    },
    /// Relay multiplexed output until every source closes, then wait for exit.
    StreamOutput,
    /// Wait for the fault to run its course without output.
    AwaitCompletion,
    /// Run the undo action once.
    RunCleanup,
}

impl Action {
    fn emit(phase: Phase, message: impl Into<String>) -> Self {
        Action::Emit {
            phase,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNDO: &str = "Restoring normal network conditions...";

    fn accepted(undo: bool) -> ExecutionEvent {
        ExecutionEvent::Accepted {
            undo: undo.then(|| UNDO.to_string()),
            message: "starting".into(),
        }
    }

    fn emitted(actions: &[Action]) -> Vec<Phase> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect()
    }

    /// Drive a sequence of events and collect every emitted phase.
    fn run(events: Vec<ExecutionEvent>) -> (ExecutionState, Vec<Phase>) {
        let mut state = ExecutionState::new();
        let mut phases = Vec::new();
        for event in events {
            let (next, actions) = state.on_event(event);
            phases.extend(emitted(&actions));
            state = next;
        }
        (state, phases)
    }

    #[test]
    fn initial_state_is_pending() {
        assert_eq!(ExecutionState::new(), ExecutionState::Pending);
        assert_eq!(ExecutionState::default().label(), "pending");
    }

    #[test]
    fn rejection_goes_straight_to_error() {
        let (state, phases) = run(vec![ExecutionEvent::Rejected {
            error: FaultError::InvalidFaultKind("meltdown".into()),
        }]);
        assert!(state.is_terminal());
        assert_eq!(phases, vec![Phase::Error]);
    }

    #[test]
    fn process_fault_skips_cleaning() {
        let (state, phases) = run(vec![
            accepted(false),
            ExecutionEvent::SetupApplied {
                live_output: true,
                message: "started".into(),
            },
            ExecutionEvent::OutputLine { line: "a".into() },
            ExecutionEvent::OutputLine { line: "b".into() },
            ExecutionEvent::WorkloadFinished { outcome: Ok(()) },
        ]);
        assert_eq!(state, ExecutionState::Completed);
        assert_eq!(
            phases,
            vec![
                Phase::Start,
                Phase::Injecting,
                Phase::Log,
                Phase::Log,
                Phase::Completed
            ]
        );
    }

    #[test]
    fn live_output_requests_streaming() {
        let (state, actions) = ExecutionState::Preparing { undo: None }.on_event(
            ExecutionEvent::SetupApplied {
                live_output: true,
                message: "m".into(),
            },
        );
        assert_eq!(state.label(), "streaming");
        assert!(actions.contains(&Action::StreamOutput));

        let (state, actions) = ExecutionState::Preparing { undo: None }.on_event(
            ExecutionEvent::SetupApplied {
                live_output: false,
                message: "m".into(),
            },
        );
        assert_eq!(state.label(), "injecting");
        assert!(actions.contains(&Action::AwaitCompletion));
    }

    #[test]
    fn undo_fault_cleans_before_completing() {
        let mut state = ExecutionState::new();
        for event in [
            accepted(true),
            ExecutionEvent::SetupApplied {
                live_output: false,
                message: "rule installed".into(),
            },
        ] {
            state = state.on_event(event).0;
        }

        let (state, actions) = state.on_event(ExecutionEvent::WorkloadFinished { outcome: Ok(()) });
        assert!(state.is_cleaning());
        assert_eq!(
            actions,
            vec![
                Action::Emit {
                    phase: Phase::Cleaning,
                    message: UNDO.into()
                },
                Action::RunCleanup
            ]
        );

        let (state, actions) = state.on_event(ExecutionEvent::CleanupFinished { outcome: Ok(()) });
        assert_eq!(state, ExecutionState::Completed);
        assert_eq!(emitted(&actions), vec![Phase::Completed]);
    }

    #[test]
    fn setup_failure_without_side_effect_skips_cleaning() {
        let (state, phases) = run(vec![
            accepted(true),
            ExecutionEvent::SetupFailed {
                error: FaultError::SetupFailed("tc failed".into()),
                partially_applied: false,
            },
        ]);
        assert_eq!(
            state,
            ExecutionState::Failed {
                error: FaultError::SetupFailed("tc failed".into())
            }
        );
        assert_eq!(phases, vec![Phase::Start, Phase::Error]);
    }

    #[test]
    fn partial_setup_still_cleans_and_reports_original_cause() {
        let spawn_error = FaultError::ProcessFailed("ping: not found".into());
        let (state, phases) = run(vec![
            accepted(true),
            ExecutionEvent::SetupFailed {
                error: spawn_error.clone(),
                partially_applied: true,
            },
            ExecutionEvent::CleanupFinished { outcome: Ok(()) },
        ]);
        assert_eq!(state, ExecutionState::Failed { error: spawn_error });
        assert_eq!(phases, vec![Phase::Start, Phase::Cleaning, Phase::Error]);
    }

    #[test]
    fn workload_failure_with_undo_still_cleans() {
        let (state, phases) = run(vec![
            accepted(true),
            ExecutionEvent::SetupApplied {
                live_output: true,
                message: "m".into(),
            },
            ExecutionEvent::WorkloadFinished {
                outcome: Err(FaultError::ProcessFailed("exit 2".into())),
            },
            ExecutionEvent::CleanupFinished { outcome: Ok(()) },
        ]);
        assert!(matches!(state, ExecutionState::Failed { error: FaultError::ProcessFailed(_) }));
        assert_eq!(
            phases,
            vec![Phase::Start, Phase::Injecting, Phase::Cleaning, Phase::Error]
        );
    }

    #[test]
    fn cleanup_failure_is_most_recent_cause() {
        let cleanup_error = FaultError::CleanupFailed("no such device".into());
        let (state, _) = run(vec![
            accepted(true),
            ExecutionEvent::SetupApplied {
                live_output: false,
                message: "m".into(),
            },
            ExecutionEvent::WorkloadFinished {
                outcome: Err(FaultError::ProcessFailed("exit 1".into())),
            },
            ExecutionEvent::CleanupFinished {
                outcome: Err(cleanup_error.clone()),
            },
        ]);
        assert_eq!(state, ExecutionState::Failed { error: cleanup_error });
    }

    #[test]
    fn process_failure_without_undo_is_error() {
        let (state, phases) = run(vec![
            accepted(false),
            ExecutionEvent::SetupApplied {
                live_output: true,
                message: "m".into(),
            },
            ExecutionEvent::WorkloadFinished {
                outcome: Err(FaultError::ProcessFailed("exit 3".into())),
            },
        ]);
        assert!(state.is_terminal());
        assert_eq!(phases.last(), Some(&Phase::Error));
    }

    #[test]
    fn terminal_states_emit_nothing_more() {
        let (state, _) = run(vec![
            accepted(false),
            ExecutionEvent::SetupApplied {
                live_output: false,
                message: "m".into(),
            },
            ExecutionEvent::WorkloadFinished { outcome: Ok(()) },
        ]);
        assert_eq!(state, ExecutionState::Completed);

        let (state, actions) = state.on_event(ExecutionEvent::OutputLine { line: "late".into() });
        assert!(actions.is_empty());
        let (state, actions) = state.on_event(ExecutionEvent::CleanupFinished {
            outcome: Err(FaultError::CleanupFailed("x".into())),
        });
        assert!(actions.is_empty());
        assert_eq!(state, ExecutionState::Completed);
    }

    #[test]
    fn invalid_transition_keeps_state() {
        let (state, actions) =
            ExecutionState::Pending.on_event(ExecutionEvent::OutputLine { line: "x".into() });
        assert_eq!(state, ExecutionState::Pending);
        assert!(actions.is_empty());
    }

    #[test]
    fn every_path_emits_exactly_one_terminal_event() {
        let setup_ok = |live| ExecutionEvent::SetupApplied {
            live_output: live,
            message: "m".into(),
        };
        let err = || FaultError::SetupFailed("x".into());
        let paths: Vec<Vec<ExecutionEvent>> = vec![
            vec![ExecutionEvent::Rejected { error: err() }],
            vec![
                accepted(false),
                ExecutionEvent::SetupFailed {
                    error: err(),
                    partially_applied: false,
                },
            ],
            vec![
                accepted(true),
                ExecutionEvent::SetupFailed {
                    error: err(),
                    partially_applied: true,
                },
                ExecutionEvent::CleanupFinished { outcome: Err(err()) },
            ],
            vec![
                accepted(true),
                setup_ok(true),
                ExecutionEvent::WorkloadFinished { outcome: Ok(()) },
                ExecutionEvent::CleanupFinished { outcome: Ok(()) },
            ],
            vec![
                accepted(false),
                setup_ok(false),
                ExecutionEvent::WorkloadFinished { outcome: Err(err()) },
            ],
        ];

        for events in paths {
            let (state, phases) = run(events.clone());
            assert!(state.is_terminal(), "{events:?}");
            let terminals = phases.iter().filter(|p| p.is_terminal()).count();
            assert_eq!(terminals, 1, "{events:?}");
            assert!(phases.last().is_some_and(Phase::is_terminal));
        }
    }
}
