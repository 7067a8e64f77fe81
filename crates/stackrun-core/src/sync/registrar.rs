//! One-shot deployment registration.

use stackrun_cloud::{CloudStack, DeploymentStackRequest, DeploymentStacksPayloadRequest, ReviewRequest};
use tracing::{debug, error, info};

use super::{bounded, CloudRun, CorrelationTable};
use crate::metadata::DeploymentMetadata;
use crate::stack::{ExecContext, Stack};

/// Stack description as sent to the service.
pub(crate) fn cloud_stack(stack: &Stack, metadata: &DeploymentMetadata) -> CloudStack {
    CloudStack {
        meta_id: stack.meta_id().unwrap_or_default(),
        meta_name: stack.name.clone(),
        meta_description: stack.description.clone(),
        meta_tags: stack.tags.clone(),
        repository: metadata.repository.clone(),
        path: stack.path.clone(),
    }
}

/// Everything sent in the create-deployment call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentBatch {
    pub payload: DeploymentStacksPayloadRequest,
}

impl DeploymentBatch {
    /// Build the batch for `contexts`, keeping selection order.
    pub fn build(
        contexts: &[ExecContext],
        metadata: &DeploymentMetadata,
        review_request: Option<ReviewRequest>,
        workdir: &str,
    ) -> Self {
        let stacks = contexts
            .iter()
            .map(|ctx| DeploymentStackRequest {
                stack: cloud_stack(&ctx.stack, metadata),
                commit_sha: metadata.commit_sha.clone().unwrap_or_default(),
                deployment_command: ctx.command_line(),
                deployment_url: metadata.deployment_url.clone().unwrap_or_default(),
            })
            .collect();

        Self {
            payload: DeploymentStacksPayloadRequest {
                review_request,
                workdir: workdir.to_string(),
                stacks,
            },
        }
    }

    /// Lower-cased meta ids in request order.
    pub fn meta_ids(&self) -> Vec<String> {
        self.payload
            .stacks
            .iter()
            .map(|s| s.stack.meta_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.payload.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.stacks.is_empty()
    }
}

/// Registers a run's stacks with the cloud and fills the correlation table.
pub struct DeploymentRegistrar;

impl DeploymentRegistrar {
    /// Register `batch` once for this run.
    ///
    /// Returns whether sync is still enabled afterwards. Any transport or
    /// protocol failure disables sync for the rest of the run; it is never
    /// returned as an error.
    pub async fn register(cloud: &mut CloudRun, batch: &DeploymentBatch) -> bool {
        if !cloud.enabled {
            return false;
        }
        if cloud.registered {
            error!(run_id = %cloud.run_id, "deployment already registered for this run");
            return cloud.enabled;
        }
        cloud.registered = true;

        let result = bounded(
            cloud.call_timeout,
            &cloud.cancel,
            cloud
                .client
                .create_deployment(&cloud.organization, &cloud.run_id, &batch.payload),
        )
        .await;

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                error!(
                    organization = %cloud.organization,
                    error = %e,
                    "failed to create cloud deployment"
                );
                cloud.disable("deployment registration failed");
                return false;
            }
        };

        for record in &records {
            debug!(stack_id = %record.stack_id, meta_id = %record.meta_id, "deployment created");
        }

        match CorrelationTable::correlate(&batch.meta_ids(), &records) {
            Ok(table) => {
                info!(
                    organization = %cloud.organization,
                    run_id = %cloud.run_id,
                    stacks = table.len(),
                    "cloud deployment created"
                );
                cloud.table = table;
                true
            }
            Err(e) => {
                error!(organization = %cloud.organization, error = %e, "invalid deployment response");
                cloud.disable("invalid deployment response");
                false
            }
        }
    }
}
