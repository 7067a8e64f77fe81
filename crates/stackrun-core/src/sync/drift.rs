//! Drift status sync.
//!
//! Drift checks are not registered as deployments. Each attempted stack's
//! result is posted on its own, carrying the full stack description.

use stackrun_cloud::{DriftStackPayloadRequest, RunStatus};
use tracing::{debug, warn};

use super::registrar::cloud_stack;
use super::{bounded, CloudRun, ReportOutcome};
use crate::metadata::DeploymentMetadata;
use crate::stack::ExecContext;

/// Sends a stack's drift check result to the cloud.
pub struct DriftReporter;

impl DriftReporter {
    /// Report `status` for the stack of `ctx`, at most once per run. Never
    /// fails the run and never disables sync.
    pub async fn report(
        cloud: &mut CloudRun,
        ctx: &ExecContext,
        metadata: &DeploymentMetadata,
        status: RunStatus,
    ) -> ReportOutcome {
        let stack = &ctx.stack;
        if !cloud.enabled {
            debug!(stack = %stack.path, %status, "cloud sync disabled; not reporting drift");
            return ReportOutcome::SyncDisabled;
        }

        let Some(meta_id) = stack.meta_id() else {
            warn!(stack = %stack.path, "stack has no id; not reporting drift");
            return ReportOutcome::NotCorrelated;
        };
        if !cloud.reported.insert(meta_id) {
            warn!(stack = %stack.path, %status, "drift status already reported for stack");
            return ReportOutcome::AlreadyReported;
        }

        let payload = DriftStackPayloadRequest {
            stack: cloud_stack(stack, metadata),
            status,
            command: ctx.command.clone(),
        };

        debug!(stack = %stack.path, %status, "syncing drift status");
        let result = bounded(
            cloud.call_timeout,
            &cloud.cancel,
            cloud.client.create_drift(&cloud.organization, &payload),
        )
        .await;

        match result {
            Ok(()) => {
                debug!(stack = %stack.path, %status, "drift status synced successfully");
                ReportOutcome::Sent
            }
            Err(e) => {
                warn!(
                    organization = %cloud.organization,
                    stack = %stack.path,
                    %status,
                    error = %e,
                    "failed to sync drift status"
                );
                ReportOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use stackrun_cloud::fakes::MemoryCloud;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(id: &str) -> ExecContext {
        ExecContext::new(
            Stack::new(Path::new("/repo"), id).with_id(id),
            vec!["terraform".to_string(), "plan".to_string()],
        )
    }

    fn cloud_run() -> (Arc<MemoryCloud>, CloudRun) {
        let cloud = Arc::new(MemoryCloud::new());
        let run = CloudRun::new(cloud.clone(), "org-1", "run-1");
        (cloud, run)
    }

    #[tokio::test]
    async fn test_drift_report_carries_stack_and_command() {
        let (cloud, mut run) = cloud_run();

        let outcome = DriftReporter::report(
            &mut run,
            &ctx("stack"),
            &DeploymentMetadata::default(),
            RunStatus::Drifted,
        )
        .await;

        assert!(outcome.is_sent());
        let drifts = cloud.drifts();
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].organization, "org-1");
        let payload = &drifts[0].payload;
        assert_eq!(payload.stack.meta_id, "stack");
        assert_eq!(payload.stack.meta_name, "stack");
        assert_eq!(payload.stack.path, "/stack");
        assert_eq!(payload.stack.repository, "local");
        assert_eq!(payload.status, RunStatus::Drifted);
        assert_eq!(payload.command, vec!["terraform", "plan"]);
        assert_eq!(cloud.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_drift_report_at_most_once() {
        let (cloud, mut run) = cloud_run();
        let metadata = DeploymentMetadata::default();

        assert!(DriftReporter::report(&mut run, &ctx("s1"), &metadata, RunStatus::Ok)
            .await
            .is_sent());
        assert_eq!(
            DriftReporter::report(&mut run, &ctx("s1"), &metadata, RunStatus::Drifted).await,
            ReportOutcome::AlreadyReported
        );
        assert_eq!(cloud.drift_calls(), 1);
    }

    #[tokio::test]
    async fn test_drift_report_skipped_when_disabled() {
        let (cloud, mut run) = cloud_run();
        run.disable("test");

        assert_eq!(
            DriftReporter::report(
                &mut run,
                &ctx("s1"),
                &DeploymentMetadata::default(),
                RunStatus::Drifted
            )
            .await,
            ReportOutcome::SyncDisabled
        );
        assert_eq!(cloud.drift_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_report_failure_keeps_sync_enabled() {
        let (cloud, run) = cloud_run();
        let mut run = run.with_call_timeout(Duration::from_secs(5));
        let metadata = DeploymentMetadata::default();

        cloud.hang_updates(true);
        assert_eq!(
            DriftReporter::report(&mut run, &ctx("s1"), &metadata, RunStatus::Drifted).await,
            ReportOutcome::Failed
        );
        assert!(run.is_enabled());

        cloud.hang_updates(false);
        cloud.fail_next_updates(1);
        assert_eq!(
            DriftReporter::report(&mut run, &ctx("s2"), &metadata, RunStatus::Ok).await,
            ReportOutcome::Failed
        );
        assert!(DriftReporter::report(&mut run, &ctx("s3"), &metadata, RunStatus::Failed)
            .await
            .is_sent());
        assert_eq!(cloud.drifted(), vec![("s3".to_string(), RunStatus::Failed)]);
    }
}
