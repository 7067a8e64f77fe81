//! Outcome classification.
//!
//! [`classify`] folds whatever happened to a stack into exactly one terminal
//! [`RunStatus`]. It is pure: no I/O, no logging.

use serde::{Deserialize, Serialize};

pub use stackrun_cloud::RunStatus;

/// Exit code a drift check uses to signal divergence.
pub const DRIFT_EXIT_CODE: i32 = 2;

/// What the run is for, selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Commands apply changes; any nonzero exit is a failure.
    #[default]
    Deployment,
    /// Commands detect drift; exit code 2 means "drifted".
    DriftCheck,
}

/// Raw result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Process ran to completion.
    Exited(i32),
    /// Process was terminated by a signal and has no exit code.
    Signaled,
    /// Executable could not be located or spawned.
    SpawnFailed { reason: String },
    /// Process was killed because the run was cancelled.
    Interrupted,
    /// Stack was never started.
    Preempted,
}

impl ExecOutcome {
    /// Whether a process was (or was attempted to be) started.
    pub fn was_attempted(&self) -> bool {
        !matches!(self, ExecOutcome::Preempted)
    }
}

/// Map an execution outcome to its terminal status.
pub fn classify(outcome: &ExecOutcome, mode: RunMode) -> RunStatus {
    match (outcome, mode) {
        (ExecOutcome::Exited(0), _) => RunStatus::Ok,
        (ExecOutcome::Exited(DRIFT_EXIT_CODE), RunMode::DriftCheck) => RunStatus::Drifted,
        (ExecOutcome::Exited(_), _) => RunStatus::Failed,
        (ExecOutcome::Signaled, _) => RunStatus::Failed,
        (ExecOutcome::SpawnFailed { .. }, _) => RunStatus::Failed,
        (ExecOutcome::Interrupted | ExecOutcome::Preempted, _) => RunStatus::Canceled,
    }
}
