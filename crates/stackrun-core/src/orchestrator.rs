//! Run orchestration.
//!
//! A run moves through `Idle → Validating → Registering → Running → Done`.
//! Stacks execute strictly one at a time in selection order. After each
//! stack the scheduling policy decides whether the next one starts.

use serde::{Deserialize, Serialize};
use stackrun_cloud::ReviewRequest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::executor::{CancelSignal, ProcessExecutor};
use crate::metadata::DeploymentMetadata;
use crate::stack::{validate_selection, ExecContext, Stack};
use crate::status::{classify, ExecOutcome, RunMode, RunStatus};
use crate::sync::{
    CloudRun, DeploymentBatch, DeploymentRegistrar, DriftReporter, ReportOutcome, StatusReporter,
};

/// What happens after a stack fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Stop scheduling after the first failure.
    #[default]
    FailFast,
    /// Run every stack regardless of earlier failures.
    ContinueOnError,
}

impl SchedulingPolicy {
    /// Whether a stack ending in `status` stops the run.
    pub fn stops_after(&self, status: RunStatus) -> bool {
        match self {
            SchedulingPolicy::FailFast => status.is_failure(),
            SchedulingPolicy::ContinueOnError => false,
        }
    }
}

/// Per-run settings.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub mode: RunMode,
    pub policy: SchedulingPolicy,
    /// Cloud sync was asked for; every stack must then declare an id, even
    /// when no cloud ends up attached.
    pub cloud_sync: bool,
    pub review_request: Option<ReviewRequest>,
    /// Directory the run was started from, as a project path.
    pub workdir: String,
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Validating,
    Registering,
    Running,
    Done,
}

/// Result of one stack.
#[derive(Debug, Clone)]
pub struct StackResult {
    pub stack: Stack,
    pub status: RunStatus,
    pub outcome: ExecOutcome,
    pub duration: Duration,
    pub report: Option<ReportOutcome>,
}

impl StackResult {
    pub fn was_reported(&self) -> bool {
        self.report.is_some_and(|r| r.is_sent())
    }
}

/// Aggregate result of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// One entry per stack of the selection, in selection order. Stacks that
    /// never started are `Canceled` with a `Preempted` outcome.
    pub results: Vec<StackResult>,
    pub sync_enabled: bool,
    pub duration: Duration,
}

impl RunOutcome {
    /// Stacks whose command was started.
    pub fn attempted(&self) -> impl Iterator<Item = &StackResult> {
        self.results.iter().filter(|r| r.outcome.was_attempted())
    }

    /// Stacks never started because of fail-fast or cancellation.
    pub fn skipped(&self) -> impl Iterator<Item = &StackResult> {
        self.results.iter().filter(|r| !r.outcome.was_attempted())
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Any stack Failed or Canceled.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status.is_failure())
    }

    pub fn has_drift(&self) -> bool {
        self.results.iter().any(|r| r.status == RunStatus::Drifted)
    }

    /// No failures and no drift.
    pub fn is_clean(&self) -> bool {
        !self.has_failures() && !self.has_drift()
    }

    /// Process exit code for the run: drift alone is not a failure.
    pub fn exit_code(&self) -> u8 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }
}

/// Drives a run over an ordered selection of stacks.
pub struct RunOrchestrator {
    executor: Arc<dyn ProcessExecutor>,
    config: RunConfig,
    cloud: Option<CloudRun>,
    metadata: DeploymentMetadata,
    phase: RunPhase,
}

impl RunOrchestrator {
    pub fn new(executor: Arc<dyn ProcessExecutor>, config: RunConfig) -> Self {
        Self {
            executor,
            config,
            cloud: None,
            metadata: DeploymentMetadata::default(),
            phase: RunPhase::Idle,
        }
    }

    /// Sync outcomes through `cloud`, describing stacks with `metadata`.
    /// Every stack must then declare an id.
    pub fn with_cloud(mut self, cloud: CloudRun, metadata: DeploymentMetadata) -> Self {
        self.cloud = Some(cloud);
        self.metadata = metadata;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, next: RunPhase) {
        debug!(from = ?self.phase, to = ?next, "run phase");
        self.phase = next;
    }

    /// Execute `contexts` in order.
    ///
    /// Only an invalid selection is an error; it is detected before anything
    /// runs. Execution failures, cancellation and cloud problems are all
    /// folded into the returned [`RunOutcome`].
    pub async fn run(&mut self, contexts: &[ExecContext], cancel: &CancelSignal) -> Result<RunOutcome> {
        let start = Instant::now();

        self.enter(RunPhase::Validating);
        let require_ids = self.config.cloud_sync || self.cloud.is_some();
        if let Err(e) = validate_selection(contexts, require_ids) {
            self.enter(RunPhase::Done);
            return Err(e);
        }

        self.enter(RunPhase::Registering);
        if let Some(cloud) = self.cloud.as_mut() {
            cloud.set_cancel(cancel.clone());
            match self.config.mode {
                RunMode::Deployment => {
                    let batch = DeploymentBatch::build(
                        contexts,
                        &self.metadata,
                        self.config.review_request.clone(),
                        &self.config.workdir,
                    );
                    if !DeploymentRegistrar::register(cloud, &batch).await {
                        warn!(stacks = batch.len(), "running without cloud sync");
                    }
                }
                RunMode::DriftCheck => debug!("drift checks are not registered as deployments"),
            }
        }

        self.enter(RunPhase::Running);
        info!(
            stacks = contexts.len(),
            mode = ?self.config.mode,
            policy = ?self.config.policy,
            "starting run"
        );

        let mut results = Vec::with_capacity(contexts.len());
        let mut stop_reason: Option<&'static str> = None;

        for ctx in contexts {
            if stop_reason.is_none() && cancel.is_cancelled() {
                stop_reason = Some("run canceled");
            }
            if let Some(reason) = stop_reason {
                debug!(stack = %ctx.stack.path, reason, "skipping stack");
                results.push(StackResult {
                    stack: ctx.stack.clone(),
                    status: classify(&ExecOutcome::Preempted, self.config.mode),
                    outcome: ExecOutcome::Preempted,
                    duration: Duration::ZERO,
                    report: None,
                });
                continue;
            }

            info!(stack = %ctx.stack.path, cmd = %ctx.command_line(), "running stack");
            let started = Instant::now();
            let outcome = self.executor.execute(ctx, cancel).await;
            let status = classify(&outcome, self.config.mode);
            let duration = started.elapsed();

            log_stack_result(&ctx.stack, &outcome, status, duration);

            let report = match (self.cloud.as_mut(), self.config.mode) {
                (Some(cloud), RunMode::Deployment) => {
                    Some(StatusReporter::report(cloud, &ctx.stack, status).await)
                }
                (Some(cloud), RunMode::DriftCheck) => {
                    Some(DriftReporter::report(cloud, ctx, &self.metadata, status).await)
                }
                (None, _) => None,
            };

            results.push(StackResult {
                stack: ctx.stack.clone(),
                status,
                outcome,
                duration,
                report,
            });

            if self.config.policy.stops_after(status) {
                stop_reason = Some("fail-fast after failed stack");
            }
        }

        self.enter(RunPhase::Done);

        let outcome = RunOutcome {
            results,
            sync_enabled: self.cloud.as_ref().is_some_and(|c| c.is_enabled()),
            duration: start.elapsed(),
        };

        let skipped = outcome.skipped().count();
        if skipped > 0 {
            warn!(skipped, reason = stop_reason.unwrap_or_default(), "stacks were not executed");
        }
        if outcome.has_failures() {
            error!(
                failed = outcome.count(RunStatus::Failed),
                canceled = outcome.count(RunStatus::Canceled),
                "run finished with failures"
            );
        } else if outcome.has_drift() {
            warn!(drifted = outcome.count(RunStatus::Drifted), "run finished with drift");
        } else {
            info!(stacks = outcome.results.len(), "run finished successfully");
        }

        Ok(outcome)
    }
}

fn log_stack_result(stack: &Stack, outcome: &ExecOutcome, status: RunStatus, duration: Duration) {
    let ms = duration.as_millis() as u64;
    match outcome {
        ExecOutcome::Exited(code) => match status {
            RunStatus::Ok => info!(stack = %stack.path, %status, duration_ms = ms, "stack finished"),
            RunStatus::Drifted => warn!(stack = %stack.path, %status, exit_code = *code, "drift detected"),
            _ => error!(stack = %stack.path, %status, exit_code = *code, "stack command failed"),
        },
        ExecOutcome::Signaled => {
            error!(stack = %stack.path, %status, "stack command terminated by signal")
        }
        ExecOutcome::SpawnFailed { reason } => {
            error!(stack = %stack.path, %status, reason = %reason, "failed to start stack command")
        }
        ExecOutcome::Interrupted | ExecOutcome::Preempted => {
            info!(stack = %stack.path, %status, "stack canceled")
        }
    }
}
