//! # fault-core
//!
//! Pure logic for chaosd. Nothing in this crate touches the network, the
//! container runtime or child processes, so every rule here is unit-tested
//! without mocks.
//!
//! ## Modules
//!
//! - [`constraint`]: fault kind -> container resource constraint policy
//! - [`netem`]: `tc netem` root-rule command builder
//! - [`workload`]: stress/probe workload command lines
//! - [`state`]: the per-execution state machine (events in, actions out)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constraint;
pub mod netem;
pub mod state;
pub mod workload;

pub use constraint::ResourceConstraint;
pub use netem::ShapingRule;
pub use state::{Action, ExecutionEvent, ExecutionState};
pub use workload::{WorkloadPrograms, WorkloadSpec};
