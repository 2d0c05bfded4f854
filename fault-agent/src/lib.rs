//! # chaosd-agent
//!
//! HTTP agent that injects faults into local containers and the host.
//!
//! This crate wires the fault engine to the outside world:
//! - Loads TOML configuration and sets up tracing
//! - Connects once to the local Docker daemon
//! - Serves the container API and the live host-fault feed
//! - Drains running faults on shutdown so their cleanup still happens
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health              liveness, version, active faults
//! GET  /metrics             Prometheus counters
//! GET  /faults              in-flight executions
//! GET  /host/inject         SSE feed of a host fault (cpu, memory, disk, network)
//! POST /docker/fault        container constraint (cpu_choke, mem_limit, restore)
//! GET  /docker/list         all containers
//! GET  /docker/status       lifecycle state of one container
//! POST /docker/start|stop   container lifecycle
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod server;
