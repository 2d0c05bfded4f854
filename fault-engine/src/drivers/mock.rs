//! In-memory drivers for testing.
//!
//! Each mock records the calls it receives and can be told to fail the
//! next call, so engine behaviour can be checked without Docker, `tc` or a
//! process table.

use super::container::{ContainerControl, ContainerSummary};
use super::process::{ExitOutcome, ProcessHandle, ProcessLauncher, RunningProcess, ScratchFile};
use super::traffic::TrafficControl;
use crate::error::DriverError;
use async_trait::async_trait;
use fault_core::{ResourceConstraint, WorkloadSpec};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn not_found(id: &str) -> DriverError {
    DriverError::Docker(bollard::errors::Error::DockerResponseServerError {
        status_code: 404,
        message: format!("No such container: {id}"),
    })
}

/// Mock container runtime.
#[derive(Debug, Clone, Default)]
pub struct MockContainerControl {
    inner: Arc<Mutex<MockContainerInner>>,
}

#[derive(Debug, Default)]
struct MockContainerInner {
    containers: BTreeMap<String, (String, String)>,
    effective: HashMap<String, ResourceConstraint>,
    updates: Vec<(String, ResourceConstraint)>,
    fail_next_update: Option<String>,
    fail_restore: Option<String>,
    unreachable: bool,
}

impl MockContainerControl {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container with a name and lifecycle state.
    pub fn with_container(self, id: &str, name: &str, state: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .containers
            .insert(id.to_string(), (name.to_string(), state.to_string()));
        self
    }

    /// Successful update calls, in order.
    pub fn updates(&self) -> Vec<(String, ResourceConstraint)> {
        self.inner.lock().unwrap().updates.clone()
    }

    /// Constraint currently in effect on `id` after every recorded update.
    pub fn effective(&self, id: &str) -> ResourceConstraint {
        self.inner
            .lock()
            .unwrap()
            .effective
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    /// Cause the next update to be rejected by the runtime.
    pub fn fail_next_update(&self, message: &str) {
        self.inner.lock().unwrap().fail_next_update = Some(message.to_string());
    }

    /// Cause every restore update to be rejected.
    pub fn fail_restore(&self, message: &str) {
        self.inner.lock().unwrap().fail_restore = Some(message.to_string());
    }

    /// Make every call fail as if the socket were gone.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unwrap().unreachable = unreachable;
    }

    /// Lifecycle state of a registered container.
    pub fn container_state(&self, id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .containers
            .get(id)
            .map(|(_, state)| state.clone())
    }

    fn check_reachable(inner: &MockContainerInner) -> Result<(), DriverError> {
        if inner.unreachable {
            return Err(DriverError::Unavailable(
                "docker socket unreachable".to_string(),
            ));
        }
        Ok(())
    }

    fn set_state(&self, id: &str, state: &str) -> Result<(), DriverError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;
        match inner.containers.get_mut(id) {
            Some((_, current)) => {
                *current = state.to_string();
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }
}

#[async_trait]
impl ContainerControl for MockContainerControl {
    async fn update(&self, id: &str, constraint: &ResourceConstraint) -> Result<(), DriverError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;

        let rejection = match inner.fail_next_update.take() {
            Some(message) => Some(message),
            None if *constraint == ResourceConstraint::restore() => inner.fail_restore.clone(),
            None => None,
        };
        if let Some(message) = rejection {
            return Err(DriverError::Docker(
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 500,
                    message,
                },
            ));
        }

        inner.updates.push((id.to_string(), *constraint));
        constraint.apply_to(inner.effective.entry(id.to_string()).or_default());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ContainerSummary>, DriverError> {
        let inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;
        Ok(inner
            .containers
            .iter()
            .map(|(id, (name, state))| ContainerSummary {
                id: id.chars().take(12).collect(),
                name: name.clone(),
                state: state.clone(),
                status: state.clone(),
            })
            .collect())
    }

    async fn state(&self, id: &str) -> Result<String, DriverError> {
        let inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;
        inner
            .containers
            .get(id)
            .map(|(_, state)| state.clone())
            .ok_or_else(|| not_found(id))
    }

    async fn start(&self, id: &str) -> Result<(), DriverError> {
        self.set_state(id, "running")
    }

    async fn stop(&self, id: &str) -> Result<(), DriverError> {
        self.set_state(id, "exited")
    }

    async fn ping(&self) -> Result<(), DriverError> {
        let inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)
    }
}

/// Mock `tc`: tracks one root rule per interface, like the kernel does.
#[derive(Debug, Clone, Default)]
pub struct MockTrafficControl {
    inner: Arc<Mutex<MockTrafficInner>>,
}

#[derive(Debug, Default)]
struct MockTrafficInner {
    rules: HashMap<String, Vec<String>>,
    commands: Vec<Vec<String>>,
    fail_next_add: Option<String>,
    fail_rule_removal: Option<String>,
    missing: bool,
}

impl MockTrafficControl {
    /// Create a mock with no rules installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every invocation, in order, including failed ones.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.inner.lock().unwrap().commands.clone()
    }

    /// Number of root rules on `iface` (0 or 1).
    pub fn rule_count(&self, iface: &str) -> usize {
        usize::from(self.inner.lock().unwrap().rules.contains_key(iface))
    }

    /// Add arguments of the rule installed on `iface`.
    pub fn installed(&self, iface: &str) -> Option<Vec<String>> {
        self.inner.lock().unwrap().rules.get(iface).cloned()
    }

    /// Cause the next add to fail with the given output.
    pub fn fail_next_add(&self, output: &str) {
        self.inner.lock().unwrap().fail_next_add = Some(output.to_string());
    }

    /// Cause every removal of an installed rule to fail with the given output.
    pub fn fail_rule_removal(&self, output: &str) {
        self.inner.lock().unwrap().fail_rule_removal = Some(output.to_string());
    }

    /// Pretend the `tc` binary is not installed.
    pub fn set_missing(&self, missing: bool) {
        self.inner.lock().unwrap().missing = missing;
    }
}

fn tc_failure(output: &str) -> DriverError {
    DriverError::Command {
        program: "tc".to_string(),
        output: output.to_string(),
    }
}

#[async_trait]
impl TrafficControl for MockTrafficControl {
    fn available(&self) -> bool {
        !self.inner.lock().unwrap().missing
    }

    async fn run(&self, args: &[String]) -> Result<(), DriverError> {
        let mut inner = self.inner.lock().unwrap();
        inner.commands.push(args.to_vec());

        if inner.missing {
            return Err(DriverError::Unavailable("tc command not found".to_string()));
        }

        let (Some(op), Some(iface)) = (args.get(1), args.get(3)) else {
            return Err(tc_failure("Command line is not complete"));
        };

        match op.as_str() {
            "add" => {
                if let Some(output) = inner.fail_next_add.take() {
                    return Err(tc_failure(&output));
                }
                if inner.rules.contains_key(iface) {
                    return Err(tc_failure("RTNETLINK answers: File exists"));
                }
                inner.rules.insert(iface.clone(), args.to_vec());
                Ok(())
            }
            "del" => {
                if !inner.rules.contains_key(iface) {
                    return Err(tc_failure("RTNETLINK answers: No such file or directory"));
                }
                if let Some(output) = inner.fail_rule_removal.clone() {
                    return Err(tc_failure(&output));
                }
                inner.rules.remove(iface);
                Ok(())
            }
            other => Err(tc_failure(&format!("unknown command \"{other}\""))),
        }
    }
}

/// Scripted behaviour of one mock workload.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    /// Lines written to stdout.
    pub stdout: Vec<String>,
    /// Lines written to stderr.
    pub stderr: Vec<String>,
    /// Exit code reported by `wait`.
    pub exit_code: i32,
    /// How long `wait` takes to return.
    pub runtime: Duration,
}

impl ScriptedRun {
    /// A run that prints `stdout` lines and exits with `exit_code`.
    pub fn new(stdout: &[&str], exit_code: i32) -> Self {
        Self {
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            exit_code,
            ..Default::default()
        }
    }

    /// Add stderr lines.
    pub fn with_stderr(mut self, stderr: &[&str]) -> Self {
        self.stderr = stderr.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Make `wait` take `runtime`.
    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = runtime;
        self
    }
}

/// Mock launcher replaying queued [`ScriptedRun`]s.
///
/// With nothing queued a workload exits 0 without output.
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    inner: Arc<Mutex<MockLauncherInner>>,
}

#[derive(Debug, Default)]
struct MockLauncherInner {
    queue: VecDeque<ScriptedRun>,
    started: Vec<WorkloadSpec>,
    missing: HashSet<String>,
    fail_next_spawn: Option<String>,
}

impl MockLauncher {
    /// Create a launcher with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behaviour of the next started workload.
    pub fn queue_run(&self, run: ScriptedRun) {
        self.inner.lock().unwrap().queue.push_back(run);
    }

    /// Every workload started, in order.
    pub fn started(&self) -> Vec<WorkloadSpec> {
        self.inner.lock().unwrap().started.clone()
    }

    /// Pretend `program` is not installed.
    pub fn set_missing(&self, program: &str) {
        self.inner.lock().unwrap().missing.insert(program.to_string());
    }

    /// Cause the next spawn to be refused by the OS.
    pub fn fail_next_spawn(&self, message: &str) {
        self.inner.lock().unwrap().fail_next_spawn = Some(message.to_string());
    }
}

struct ScriptedHandle {
    exit_code: i32,
    runtime: Duration,
    killed: bool,
}

#[async_trait]
impl ProcessHandle for ScriptedHandle {
    async fn wait(&mut self) -> Result<ExitOutcome, DriverError> {
        if self.killed {
            return Ok(ExitOutcome { code: None });
        }
        if !self.runtime.is_zero() {
            tokio::time::sleep(self.runtime).await;
        }
        Ok(ExitOutcome {
            code: Some(self.exit_code),
        })
    }

    async fn kill(&mut self) -> Result<(), DriverError> {
        self.killed = true;
        Ok(())
    }
}

fn lines_reader(lines: &[String]) -> Cursor<Vec<u8>> {
    let mut buf = Vec::new();
    for line in lines {
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }
    Cursor::new(buf)
}

impl ProcessLauncher for MockLauncher {
    fn start(&self, spec: &WorkloadSpec) -> Result<RunningProcess, DriverError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.missing.contains(&spec.program) {
            return Err(DriverError::spawn(
                &spec.program,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            ));
        }
        if let Some(message) = inner.fail_next_spawn.take() {
            return Err(DriverError::spawn(
                &spec.program,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, message),
            ));
        }

        let scratch = match &spec.scratch {
            Some(path) => {
                std::fs::write(path, b"")?;
                Some(ScratchFile::new(path))
            }
            None => None,
        };

        inner.started.push(spec.clone());
        let run = inner.queue.pop_front().unwrap_or_default();

        Ok(RunningProcess::new(
            spec.program.clone(),
            Box::new(lines_reader(&run.stdout)),
            Box::new(lines_reader(&run.stderr)),
            Box::new(ScriptedHandle {
                exit_code: run.exit_code,
                runtime: run.runtime,
                killed: false,
            }),
            scratch,
        ))
    }
}
