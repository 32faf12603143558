//! # Dispatcher
//!
//! Redundant dispatch of one request over interchangeable resources.
//!
//! Responsibilities:
//! - Rotate over resources on a timer, sweep the list again until a loop limit
//! - Track overlapping in-flight attempts and cancel the ones no longer wanted
//! - Deliver exactly one terminal outcome to completion subscribers
//! - Remember which resource last answered ([`Registry`])

mod attempt;
mod engine;
pub mod error;
pub mod metrics;
mod registry;

pub use attempt::{CancelHook, PendingAttempt};
pub use contracts::{
    AttemptStatus, ConfigPatch, DispatchSnapshot, DispatchStatus, FailurePolicy, LoopDelay,
    LoopLimit, RedundancyConfig, RotateDelay,
};
pub use engine::{dispatch, Dispatch, DoneCallback, QueryCallback};
pub use error::{AttemptError, DispatchFailure, DispatcherError};
pub use metrics::{MetricsSnapshot, RegistryMetrics};
pub use registry::Registry;
