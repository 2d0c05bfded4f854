//! # fault-engine
//!
//! Runs chaosd fault executions end to end.
//!
//! - [`drivers`]: container control (Docker API), traffic control (`tc`) and
//!   process launching, each behind a trait with a mock for tests
//! - [`mux`]: merges live output streams into one ordered line feed
//! - [`engine`]: the runner that drives `fault_core::state` and guarantees
//!   cleanup
//! - [`sink`], [`registry`], [`metrics`]: event delivery, in-flight
//!   bookkeeping and counters
//!
//! ## Architecture
//!
//! ```text
//! FaultSubmission ──► FaultEngine ──► ResourceDriver ──► Docker socket
//!                         │      └──► NetworkShaper  ──► tc qdisc
//!                         │      └──► ProcessLauncher ─► stress-ng / fio / ping
//!                         │                                  │ stdout, stderr
//!                         │◄──────────── mux::merge ◄────────┘
//!                         ▼
//!                     EventSink (Vec, mpsc)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod drivers;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod mux;
pub mod registry;
pub mod sink;

pub use engine::{EngineSettings, FaultEngine, FaultFeed};
pub use error::DriverError;
pub use metrics::EngineMetrics;
pub use registry::{ActiveFault, ActiveFaults};
pub use sink::EventSink;
