//! Fault execution: drives one request through the lifecycle state machine.
//!
//! The [`ExecutionState`] transition function decides *what* happens next;
//! this module performs the side effects it asks for (driver calls, output
//! streaming, waiting, cleanup) and feeds the outcomes back in as events.
//!
//! # Concurrency
//!
//! Each spawned execution is its own tokio task, detached from whoever
//! submitted it. The subscriber may go away at any point; the execution
//! keeps running and still undoes its side effects.
//!
//! Executions are **not** serialized per target. Two faults against the same
//! container or interface race at the control-API level and the last `apply`
//! wins; when the first one cleans up it restores defaults underneath the
//! second. Operators are expected to run one fault per target at a time.

use crate::drivers::{
    ContainerControl, NetworkShaper, ProcessLauncher, ResourceDriver, RunningProcess,
    TrafficControl,
};
use crate::error::DriverError;
use crate::metrics::EngineMetrics;
use crate::mux;
use crate::registry::ActiveFaults;
use crate::sink::EventSink;
use dashmap::DashMap;
use fault_core::state::{Action, ExecutionEvent, ExecutionState};
use fault_core::{ShapingRule, WorkloadPrograms, WorkloadSpec};
use fault_types::{
    FaultError, FaultEvent, FaultKind, FaultParams, FaultRequest, FaultSubmission, Phase,
    RequestDefaults, Target,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

const RESTORE_CONTAINER_MESSAGE: &str = "Restoring container resources...";
const RESTORE_NETWORK_MESSAGE: &str = "Restoring normal network conditions...";
const PROBE_MESSAGE: &str = "Running ping test to visualize fault...";

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Defaults applied while validating submissions.
    pub defaults: RequestDefaults,
    /// Workload executables.
    pub programs: WorkloadPrograms,
    /// Host pinged while a network fault is visualized.
    pub probe_host: String,
    /// Directory for disk-stress scratch files.
    pub scratch_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            defaults: RequestDefaults::default(),
            programs: WorkloadPrograms::default(),
            probe_host: "1.1.1.1".to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Live event feed of a spawned execution.
#[derive(Debug)]
pub struct FaultFeed {
    /// Execution id (as listed in the active registry).
    pub id: Uuid,
    /// Events in emission order; closes after the terminal event.
    pub events: mpsc::UnboundedReceiver<FaultEvent>,
}

/// The fault execution engine.
///
/// Holds the long-lived drivers; one instance serves the whole process.
pub struct FaultEngine {
    settings: EngineSettings,
    resources: ResourceDriver,
    shaper: NetworkShaper,
    launcher: Arc<dyn ProcessLauncher>,
    active: ActiveFaults,
    /// Undo actions whose side effect is currently in place.
    armed: DashMap<Uuid, Undo>,
    metrics: EngineMetrics,
    shutdown: watch::Sender<bool>,
}

/// Side effect that must be reversed before the execution ends.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Undo {
    Restore(String),
    RemoveRule(String),
}

impl Undo {
    fn for_request(request: &FaultRequest) -> Option<Self> {
        if !request.has_undo() {
            return None;
        }
        match (&request.target, &request.params) {
            (Target::Container(id), FaultParams::Constraint { .. }) => {
                Some(Undo::Restore(id.clone()))
            }
            (_, FaultParams::Network { shaping, .. }) => {
                Some(Undo::RemoveRule(shaping.interface.clone()))
            }
            _ => None,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Undo::Restore(_) => RESTORE_CONTAINER_MESSAGE,
            Undo::RemoveRule(_) => RESTORE_NETWORK_MESSAGE,
        }
    }
}

/// A fault that is now in effect.
struct Injection {
    message: String,
    process: Option<RunningProcess>,
    fatal_exit: bool,
}

struct SetupFailure {
    error: FaultError,
    partially_applied: bool,
}

impl SetupFailure {
    fn nothing_applied(error: DriverError) -> Self {
        Self {
            error: error.into_setup_error(),
            partially_applied: false,
        }
    }
}

/// Per-execution bookkeeping: current state, subscriber, registry entry.
struct Execution<'a, 's> {
    id: Uuid,
    state: ExecutionState,
    sink: &'a mut (dyn EventSink + 's),
    subscribed: bool,
    engine: &'a FaultEngine,
}

impl Execution<'_, '_> {
    /// Apply one event; emits are performed here, the other actions returned.
    fn step(&mut self, event: ExecutionEvent) -> Vec<Action> {
        let (next, actions) = std::mem::take(&mut self.state).on_event(event);
        self.state = next;

        if !self.state.is_terminal() {
            self.engine.active.update(&self.id, self.state.label());
        }

        let mut pending = Vec::new();
        for action in actions {
            match action {
                Action::Emit { phase, message } => self.emit(phase, message),
                other => pending.push(other),
            }
        }
        pending
    }

    fn emit(&mut self, phase: Phase, message: String) {
        let metrics = &self.engine.metrics;
        match phase {
            Phase::Start => EngineMetrics::incr(&metrics.started_total),
            Phase::Log => EngineMetrics::incr(&metrics.log_lines_total),
            Phase::Completed => EngineMetrics::incr(&metrics.completed_total),
            Phase::Error => EngineMetrics::incr(&metrics.failed_total),
            Phase::Injecting | Phase::Cleaning => {}
        }

        if phase.is_terminal() {
            self.engine.active.remove(&self.id);
            tracing::info!(id = %self.id, state = phase.as_str(), "{}", message);
        } else if phase != Phase::Log {
            tracing::info!(id = %self.id, state = phase.as_str(), "{}", message);
        }

        if self.subscribed && !self.sink.deliver(FaultEvent::new(phase, message)) {
            tracing::debug!(id = %self.id, "subscriber gone, execution continues");
            self.subscribed = false;
        }
    }

    fn outcome(self) -> Result<(), FaultError> {
        match self.state {
            ExecutionState::Completed => Ok(()),
            ExecutionState::Failed { error } => Err(error),
            other => Err(FaultError::ProcessFailed(format!(
                "execution stopped in {} state",
                other.label()
            ))),
        }
    }
}

impl FaultEngine {
    /// Create an engine over the given control facilities.
    pub fn new(
        settings: EngineSettings,
        containers: Arc<dyn ContainerControl>,
        traffic: Arc<dyn TrafficControl>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            settings,
            resources: ResourceDriver::new(containers),
            shaper: NetworkShaper::new(traffic),
            launcher,
            active: ActiveFaults::new(),
            armed: DashMap::new(),
            metrics: EngineMetrics::default(),
            shutdown,
        }
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The container control API the engine applies constraints through.
    pub fn containers(&self) -> &Arc<dyn ContainerControl> {
        self.resources.control()
    }

    /// In-flight executions.
    pub fn active(&self) -> &ActiveFaults {
        &self.active
    }

    /// Engine counters.
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Run one fault to its terminal event in the caller's task.
    ///
    /// Every event, including the terminal one, goes to `sink`. The return
    /// value mirrors the terminal event.
    pub async fn run(
        &self,
        submission: &FaultSubmission,
        sink: &mut dyn EventSink,
    ) -> Result<(), FaultError> {
        self.execute(Uuid::new_v4(), submission, sink).await
    }

    /// Run one fault as a detached task and return its live feed.
    ///
    /// Dropping the feed does not stop the execution. If the task panics
    /// while the fault is still registered, any side effect already in place
    /// gets one undo attempt and a terminal `error` event is sent in its place.
    pub fn spawn(self: &Arc<Self>, submission: FaultSubmission) -> FaultFeed {
        let id = Uuid::new_v4();
        let (tx, events) = mpsc::unbounded_channel();
        let mut fallback = tx.clone();

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut sink = tx;
            engine.execute(id, &submission, &mut sink).await
        });

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!(%id, "fault execution task failed: {}", e);
                let armed = engine.armed.remove(&id).map(|(_, undo)| undo);
                if !engine.active.contains(&id) {
                    return;
                }

                let mut message = format!("fault execution aborted: {e}");
                if let Some(undo) = armed {
                    fallback.deliver(FaultEvent::new(Phase::Cleaning, undo.message()));
                    if let Err(cleanup) = engine.undo(&undo).await {
                        message = format!("{message}; {cleanup}");
                    }
                }
                // Deregister only now so drain() waits for the undo above
                engine.active.remove(&id);
                EngineMetrics::incr(&engine.metrics.failed_total);
                fallback.deliver(FaultEvent::new(Phase::Error, message));
            }
        });

        FaultFeed { id, events }
    }

    /// Ask running faults to end early and wait for their cleanup.
    ///
    /// Returns `false` if executions were still in flight at the deadline.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.shutdown.send_replace(true);

        let deadline = tokio::time::Instant::now() + timeout;
        while !self.active.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    remaining = self.active.len(),
                    "drain timed out with faults still active"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    async fn execute(
        &self,
        id: Uuid,
        submission: &FaultSubmission,
        sink: &mut dyn EventSink,
    ) -> Result<(), FaultError> {
        let mut exec = Execution {
            id,
            state: ExecutionState::new(),
            sink,
            subscribed: true,
            engine: self,
        };

        let request = match submission.validate(&self.settings.defaults) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(%id, kind = %submission.kind, "fault rejected: {}", error);
                exec.step(ExecutionEvent::Rejected { error });
                return exec.outcome();
            }
        };

        let target = match &request.target {
            Target::Container(container) => Some(container.clone()),
            Target::Host => None,
        };
        self.active
            .register(id, request.kind.as_str(), target, exec.state.label());

        let undo = Undo::for_request(&request);
        exec.step(ExecutionEvent::Accepted {
            undo: undo.as_ref().map(|u| u.message().to_string()),
            message: self.start_message(&request),
        });

        let (event, mut process, fatal_exit) = match self.prepare(id, &request).await {
            Ok(injection) => (
                ExecutionEvent::SetupApplied {
                    live_output: injection.process.is_some(),
                    message: injection.message,
                },
                injection.process,
                injection.fatal_exit,
            ),
            Err(failure) => (
                ExecutionEvent::SetupFailed {
                    error: failure.error,
                    partially_applied: failure.partially_applied,
                },
                None,
                false,
            ),
        };

        let mut actions: VecDeque<Action> = exec.step(event).into();
        while let Some(action) = actions.pop_front() {
            let event = match action {
                Action::StreamOutput => {
                    let outcome = match process.take() {
                        Some(running) => self.stream(&mut exec, running, fatal_exit).await,
                        None => Ok(()),
                    };
                    ExecutionEvent::WorkloadFinished { outcome }
                }
                Action::AwaitCompletion => {
                    self.hold(hold_time(&request)).await;
                    ExecutionEvent::WorkloadFinished { outcome: Ok(()) }
                }
                Action::RunCleanup => {
                    let outcome = match &undo {
                        Some(undo) => self.undo(undo).await,
                        None => Ok(()),
                    };
                    self.armed.remove(&id);
                    ExecutionEvent::CleanupFinished { outcome }
                }
                Action::Emit { .. } => continue,
            };
            actions.extend(exec.step(event));
        }

        self.armed.remove(&id);
        exec.outcome()
    }

    /// Record that `request`'s side effect is now in place.
    fn arm(&self, id: Uuid, request: &FaultRequest) {
        if let Some(undo) = Undo::for_request(request) {
            self.armed.insert(id, undo);
        }
    }

    fn start_message(&self, request: &FaultRequest) -> String {
        match (&request.target, &request.params) {
            (Target::Container(id), _) => {
                format!("Applying {} to container {}", request.kind, id)
            }
            (_, FaultParams::Network { shaping, .. }) => ShapingRule::from_params(shaping).describe(),
            _ => format!("Starting {} stress test", request.kind),
        }
    }

    /// Kind-specific setup: apply the constraint or rule, start the workload.
    async fn prepare(&self, id: Uuid, request: &FaultRequest) -> Result<Injection, SetupFailure> {
        match (&request.target, &request.params) {
            (Target::Container(container), FaultParams::Constraint { .. }) => {
                let ack = self
                    .resources
                    .apply(container, request.kind)
                    .await
                    .map_err(SetupFailure::nothing_applied)?;
                self.arm(id, request);
                Ok(Injection {
                    message: ack.summary,
                    process: None,
                    fatal_exit: false,
                })
            }

            (Target::Host, FaultParams::Stress { duration }) => {
                let programs = &self.settings.programs;
                let spec = match request.kind {
                    FaultKind::CpuStress => WorkloadSpec::cpu_stress(programs, *duration),
                    FaultKind::MemStress => WorkloadSpec::memory_stress(programs, *duration),
                    FaultKind::DiskStress => WorkloadSpec::disk_stress(
                        programs,
                        *duration,
                        self.settings
                            .scratch_dir
                            .join(format!("chaosd-disk-{}.dat", id.simple())),
                    ),
                    other => {
                        return Err(SetupFailure::nothing_applied(DriverError::InvalidFaultKind(
                            other.to_string(),
                        )))
                    }
                };

                let process = self
                    .launcher
                    .start(&spec)
                    .map_err(SetupFailure::nothing_applied)?;
                Ok(Injection {
                    message: format!(
                        "Started {} stress test for {}s",
                        request.kind,
                        duration.as_secs()
                    ),
                    process: Some(process),
                    fatal_exit: spec.fatal_exit,
                })
            }

            (
                Target::Host,
                FaultParams::Network {
                    shaping,
                    duration,
                    visualize,
                },
            ) => {
                self.shaper
                    .ensure_available()
                    .map_err(SetupFailure::nothing_applied)?;

                let rule = ShapingRule::from_params(shaping);
                self.shaper
                    .apply(&rule)
                    .await
                    .map_err(SetupFailure::nothing_applied)?;
                self.arm(id, request);

                if !*visualize {
                    return Ok(Injection {
                        message: format!(
                            "Holding netem rule on {} for {}s",
                            rule.interface,
                            duration.as_secs()
                        ),
                        process: None,
                        fatal_exit: false,
                    });
                }

                let spec = WorkloadSpec::network_probe(
                    &self.settings.programs,
                    *duration,
                    &self.settings.probe_host,
                );
                // The rule is in place now; a failed probe still needs cleanup
                let process = self.launcher.start(&spec).map_err(|e| SetupFailure {
                    error: e.into_setup_error(),
                    partially_applied: true,
                })?;
                Ok(Injection {
                    message: PROBE_MESSAGE.to_string(),
                    process: Some(process),
                    fatal_exit: spec.fatal_exit,
                })
            }

            _ => Err(SetupFailure::nothing_applied(DriverError::InvalidFaultKind(
                request.kind.to_string(),
            ))),
        }
    }

    /// Relay workload output until every stream closes, then reap the process.
    async fn stream(
        &self,
        exec: &mut Execution<'_, '_>,
        mut process: RunningProcess,
        fatal_exit: bool,
    ) -> Result<(), FaultError> {
        let mut lines = mux::merge(process.take_outputs());
        let mut stop = self.shutdown.subscribe();
        let mut killed = false;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Some(line) => {
                        exec.step(ExecutionEvent::OutputLine { line });
                    }
                    None => break,
                },
                _ = stopped(&mut stop), if !killed => {
                    tracing::warn!(id = %exec.id, "shutdown requested, stopping {}", process.program());
                    killed = true;
                    if let Err(e) = process.kill().await {
                        tracing::warn!(id = %exec.id, "failed to stop {}: {}", process.program(), e);
                    }
                }
            }
        }

        // Output can close before the process exits
        let exit = if killed {
            process.wait().await
        } else {
            tokio::select! {
                exit = process.wait() => exit,
                _ = stopped(&mut stop) => {
                    tracing::warn!(id = %exec.id, "shutdown requested, stopping {}", process.program());
                    if let Err(e) = process.kill().await {
                        tracing::warn!(id = %exec.id, "failed to stop {}: {}", process.program(), e);
                    }
                    process.wait().await
                }
            }
        }
        .map_err(|e| FaultError::ProcessFailed(e.to_string()))?;

        if exit.success() {
            Ok(())
        } else if fatal_exit {
            Err(FaultError::ProcessFailed(format!(
                "{} {}",
                process.program(),
                exit
            )))
        } else {
            tracing::debug!(id = %exec.id, "{} {}", process.program(), exit);
            Ok(())
        }
    }

    /// Keep a fault in effect for `duration`, or until shutdown.
    async fn hold(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let mut stop = self.shutdown.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = stopped(&mut stop) => {
                tracing::warn!("shutdown requested, ending fault early");
            }
        }
    }

    /// Single cleanup attempt; a failure is reported, never retried.
    async fn undo(&self, undo: &Undo) -> Result<(), FaultError> {
        let result = match undo {
            Undo::Restore(container) => self.resources.clear(container).await,
            Undo::RemoveRule(interface) => self.shaper.clear(interface).await,
        };
        result.map(|_| ()).map_err(|e| {
            EngineMetrics::incr(&self.metrics.cleanup_failures_total);
            tracing::error!("cleanup failed, manual intervention needed: {}", e);
            e.into_cleanup_error()
        })
    }
}

impl std::fmt::Debug for FaultEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultEngine")
            .field("settings", &self.settings)
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

/// How long a fault without a workload process stays in effect.
fn hold_time(request: &FaultRequest) -> Duration {
    match &request.params {
        FaultParams::Constraint { hold } if request.has_undo() => hold.unwrap_or_default(),
        FaultParams::Network { duration, .. } => *duration,
        _ => Duration::ZERO,
    }
}

/// Resolves once shutdown has been requested. Never resolves if the engine
/// is gone.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
