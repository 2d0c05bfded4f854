//! # fault-types
//!
//! Request, event and error types shared by every chaosd crate.
//!
//! - [`FaultSubmission`] - a fault description exactly as a caller sent it
//! - [`FaultRequest`] - the validated, immutable form the engine executes
//! - [`FaultKind`], [`Target`], [`FaultParams`] - what to break and where
//! - [`FaultEvent`], [`Phase`] - the ordered feed reported back to callers
//! - [`FaultError`] - error taxonomy surfaced in terminal events

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod request;

pub use error::FaultError;
pub use event::{unix_millis, FaultEvent, Phase};
pub use request::{
    FaultFamily, FaultKind, FaultParams, FaultRequest, FaultSubmission, NetworkParams,
    RequestDefaults, Target, DEFAULT_DELAY, DEFAULT_LOSS,
};
