//! External workload processes.
//!
//! A workload is launched without a shell, with stdin closed and both output
//! streams piped back to the engine. The child is killed if its handle is
//! dropped before it exits.

use crate::error::DriverError;
use async_trait::async_trait;
use fault_core::WorkloadSpec;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncRead;

/// One readable output stream of a running workload.
pub type OutputSource = Box<dyn AsyncRead + Send + Unpin>;

/// How a workload process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exited with status {}", code),
            None => write!(f, "was terminated by a signal"),
        }
    }
}

/// Waitable handle on a running process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Wait for the process to exit.
    async fn wait(&mut self) -> Result<ExitOutcome, DriverError>;

    /// Kill the process and reap it.
    async fn kill(&mut self) -> Result<(), DriverError>;
}

/// Removes a scratch file when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Take ownership of `path` for cleanup.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "scratch file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), "failed to remove scratch file: {}", e),
        }
    }
}

/// A started workload: its output streams, exit handle and scratch file.
pub struct RunningProcess {
    program: String,
    stdout: Option<OutputSource>,
    stderr: Option<OutputSource>,
    handle: Box<dyn ProcessHandle>,
    _scratch: Option<ScratchFile>,
}

impl RunningProcess {
    /// Assemble a running process from its parts.
    pub fn new(
        program: impl Into<String>,
        stdout: OutputSource,
        stderr: OutputSource,
        handle: Box<dyn ProcessHandle>,
        scratch: Option<ScratchFile>,
    ) -> Self {
        Self {
            program: program.into(),
            stdout: Some(stdout),
            stderr: Some(stderr),
            handle,
            _scratch: scratch,
        }
    }

    /// Take both output streams (stdout first). Empty on the second call.
    pub fn take_outputs(&mut self) -> Vec<OutputSource> {
        self.stdout
            .take()
            .into_iter()
            .chain(self.stderr.take())
            .collect()
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitOutcome, DriverError> {
        self.handle.wait().await
    }

    /// Kill the process early (shutdown). `wait` still reports its exit.
    pub async fn kill(&mut self) -> Result<(), DriverError> {
        self.handle.kill().await
    }

    /// Program name, for messages.
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningProcess")
            .field("program", &self.program)
            .field("scratch", &self._scratch)
            .finish_non_exhaustive()
    }
}

/// Starts workload processes.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the workload. Returns once the process exists.
    fn start(&self, spec: &WorkloadSpec) -> Result<RunningProcess, DriverError>;
}

/// [`ProcessLauncher`] using the host process table.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    /// Create a launcher.
    pub fn new() -> Self {
        Self
    }
}

struct ChildHandle(tokio::process::Child);

#[async_trait]
impl ProcessHandle for ChildHandle {
    async fn wait(&mut self) -> Result<ExitOutcome, DriverError> {
        let status = self.0.wait().await?;
        Ok(ExitOutcome {
            code: status.code(),
        })
    }

    async fn kill(&mut self) -> Result<(), DriverError> {
        self.0.kill().await?;
        Ok(())
    }
}

impl ProcessLauncher for SystemLauncher {
    fn start(&self, spec: &WorkloadSpec) -> Result<RunningProcess, DriverError> {
        // Guard first so a failed spawn still removes anything left behind
        let scratch = spec.scratch.as_ref().map(ScratchFile::new);

        let mut child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::spawn(&spec.program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Unavailable(format!("{} stdout not captured", spec.program)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DriverError::Unavailable(format!("{} stderr not captured", spec.program)))?;

        tracing::info!(pid = child.id(), "started {}", spec.to_command_string());

        Ok(RunningProcess::new(
            spec.program.clone(),
            Box::new(stdout),
            Box::new(stderr),
            Box::new(ChildHandle(child)),
            scratch,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_outcome_display() {
        assert!(ExitOutcome { code: Some(0) }.success());
        assert!(!ExitOutcome { code: Some(1) }.success());
        assert!(!ExitOutcome { code: None }.success());
        assert_eq!(ExitOutcome { code: Some(2) }.to_string(), "exited with status 2");
        assert_eq!(ExitOutcome { code: None }.to_string(), "was terminated by a signal");
    }

    #[test]
    fn scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chaosd-disk.dat");
        std::fs::write(&path, b"data").unwrap();

        drop(ScratchFile::new(&path));
        assert!(!path.exists());

        // Already gone is fine
        drop(ScratchFile::new(&path));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let spec = WorkloadSpec {
            program: "chaosd-no-such-binary".into(),
            args: vec![],
            scratch: None,
            fatal_exit: true,
        };
        let err = SystemLauncher::new().start(&spec).unwrap_err();
        assert!(matches!(err, DriverError::Unavailable(msg) if msg == "chaosd-no-such-binary command not found"));
    }

    #[tokio::test]
    async fn failed_spawn_still_removes_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("left-behind.dat");
        std::fs::write(&path, b"x").unwrap();

        let spec = WorkloadSpec {
            program: "chaosd-no-such-binary".into(),
            args: vec![],
            scratch: Some(path.clone()),
            fatal_exit: true,
        };
        assert!(SystemLauncher::new().start(&spec).is_err());
        assert!(!path.exists());
    }
}
