//! Per-stack status updates.

use stackrun_cloud::{RunStatus, UpdateDeploymentStacks};
use tracing::{debug, error, warn};

use super::{bounded, CloudRun};
use crate::stack::Stack;

/// What happened to one status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Update acknowledged by the service.
    Sent,
    /// Sync is disabled for this run.
    SyncDisabled,
    /// No remote id for this stack.
    NotCorrelated,
    /// This stack already had its status reported in this run.
    AlreadyReported,
    /// The call failed; the stack's status is unchanged.
    Failed,
}

impl ReportOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, ReportOutcome::Sent)
    }
}

/// Sends a stack's terminal status to the cloud.
pub struct StatusReporter;

impl StatusReporter {
    /// Report `status` for `stack`. Never fails the run.
    pub async fn report(cloud: &mut CloudRun, stack: &Stack, status: RunStatus) -> ReportOutcome {
        if !cloud.enabled {
            debug!(stack = %stack.path, %status, "cloud sync disabled; not reporting");
            return ReportOutcome::SyncDisabled;
        }

        let Some(meta_id) = stack.meta_id() else {
            warn!(stack = %stack.path, "stack has no id; not reporting");
            return ReportOutcome::NotCorrelated;
        };

        let Some(stack_id) = cloud.table.stack_id(&meta_id).cloned() else {
            error!(
                organization = %cloud.organization,
                stack = %stack.path,
                %status,
                "unable to update deployment status due to invalid API response"
            );
            return ReportOutcome::NotCorrelated;
        };

        if !cloud.reported.insert(meta_id) {
            error!(stack = %stack.path, %status, "deployment status already reported for stack");
            return ReportOutcome::AlreadyReported;
        }

        debug!(stack = %stack.path, %stack_id, %status, "updating deployment status");

        let payload = UpdateDeploymentStacks::single(stack_id.clone(), status);
        let result = bounded(
            cloud.call_timeout,
            &cloud.cancel,
            cloud
                .client
                .update_deployment_stacks(&cloud.organization, &cloud.run_id, &payload),
        )
        .await;

        match result {
            Ok(()) => {
                debug!(stack = %stack.path, %status, "deployment status synced successfully");
                ReportOutcome::Sent
            }
            Err(e) => {
                warn!(
                    organization = %cloud.organization,
                    stack = %stack.path,
                    %stack_id,
                    %status,
                    error = %e,
                    "failed to update deployment status"
                );
                ReportOutcome::Failed
            }
        }
    }
}
