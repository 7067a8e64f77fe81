//! stackrun core - run orchestration with cloud deployment sync
//!
//! Runs a command across an ordered selection of stacks and synchronises each
//! stack's outcome with the cloud:
//! - validates the selection (stack ids present and unique)
//! - registers the whole run as one deployment and correlates remote ids
//! - executes stacks one at a time under a fail-fast or continue-on-error policy
//! - classifies each outcome and reports it, at most once per stack, as a
//!   deployment status or, for drift checks, as a drift record
//!
//! Sync problems never change what runs or the run's result.

pub mod error;
pub mod executor;
pub mod manifest;
pub mod metadata;
pub mod orchestrator;
pub mod stack;
pub mod status;
pub mod sync;
pub mod telemetry;

pub use error::{OrchestratorError, Result};
pub use executor::{cancel_pair, CancelHandle, CancelSignal, ProcessExecutor, TokioProcessExecutor};
pub use manifest::{ManifestStack, StackManifest};
pub use metadata::DeploymentMetadata;
pub use orchestrator::{
    RunConfig, RunOrchestrator, RunOutcome, RunPhase, SchedulingPolicy, StackResult,
};
pub use stack::{validate_selection, ExecContext, Stack};
pub use status::{classify, ExecOutcome, RunMode, RunStatus, DRIFT_EXIT_CODE};
pub use sync::{
    CloudRun, CorrelationTable, DeploymentBatch, DeploymentRegistrar, DriftReporter, ReportOutcome,
    StatusReporter, CANCELED_CALL_GRACE,
};
pub use telemetry::{init_tracing, LogFormat};
