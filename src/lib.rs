//! kube-promec - turns data files dropped in a shared directory into Kubernetes Jobs
//!
//! A polling controller: every interval it lists the watched directory, works
//! out which raw files have no processed output and no job yet, and submits
//! one two-stage Job (search, then index) per file. Submission pauses while
//! any of its pods is stuck pending.
//!
//! # Modules
//!
//! - [`config`] - Flags, environment and the validated controller configuration
//! - [`scanner`] - Directory listing and file classification
//! - [`resolver`] - Source files lacking a processed counterpart
//! - [`tracker`] - Files already claimed by a submitted job
//! - [`gate`] - Admission control based on pending pods
//! - [`job`] - Job template builder
//! - [`submitter`] - Job creation
//! - [`controller`] - Reconciliation driver
//! - [`kube_api`] - Kubernetes client seam
//! - [`backoff`] - Poll delay on repeated failures
//! - [`telemetry`] / [`metrics`] - Logging, tracing and metrics
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod backoff;
pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod job;
pub mod kube_api;
pub mod metrics;
pub mod resolver;
pub mod scanner;
pub mod submitter;
pub mod telemetry;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ControllerArgs, ControllerConfig, MatchMode};
pub use controller::{CycleOutcome, Reconciler};
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default label key binding a job to the file it processes
pub const DEFAULT_OWNER_LABEL: &str = "promec-file";

/// Prefix of every job name created by the controller
pub const JOB_NAME_PREFIX: &str = "comet-indexer";
