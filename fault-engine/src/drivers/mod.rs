//! Drivers translating fault intents into runtime and OS operations.
//!
//! Each driver sits behind a trait so the engine can run against the real
//! Docker socket, `tc` binary and process table, or against the mocks used
//! in tests.

mod container;
mod mock;
mod process;
mod traffic;

pub use container::{Ack, ContainerControl, ContainerSummary, DockerControl, ResourceDriver};
pub use mock::{MockContainerControl, MockLauncher, MockTrafficControl, ScriptedRun};
pub use process::{
    ExitOutcome, OutputSource, ProcessHandle, ProcessLauncher, RunningProcess, ScratchFile,
    SystemLauncher,
};
pub use traffic::{NetworkShaper, TcCommand, TrafficControl};
