//! Wire types for the deployment-sync protocol.
//!
//! Deployment runs use two calls:
//! - `POST .../stacks` with a [`DeploymentStacksPayloadRequest`] registers every
//!   stack of a run and answers with one [`DeploymentStackResponse`] per stack;
//! - `PATCH .../stacks` with an [`UpdateDeploymentStacks`] moves stacks to a
//!   terminal [`RunStatus`].
//!
//! Drift checks skip registration and post one [`DriftStackPayloadRequest`]
//! per stack to the drifts resource.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CloudError;

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Terminal status of one stack in one run.
///
/// Decoding goes through [`FromStr`], so an unknown wire value surfaces as
/// [`CloudError::InvalidStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum RunStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Failed")]
    Failed,
    #[serde(rename = "Canceled")]
    Canceled,
    #[serde(rename = "Drifted")]
    Drifted,
}

impl RunStatus {
    /// Fixed wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "OK",
            RunStatus::Failed => "Failed",
            RunStatus::Canceled => "Canceled",
            RunStatus::Drifted => "Drifted",
        }
    }

    /// Failed and Canceled make a run unsuccessful.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Canceled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(RunStatus::Ok),
            "Failed" => Ok(RunStatus::Failed),
            "Canceled" => Ok(RunStatus::Canceled),
            "Drifted" => Ok(RunStatus::Drifted),
            other => Err(CloudError::InvalidStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for RunStatus {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// StackId
// ---------------------------------------------------------------------------

/// Remote-assigned stack identifier.
///
/// Opaque to the client: whatever JSON scalar the service hands out is sent
/// back unchanged in status updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StackId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackId::Numeric(n) => write!(f, "{}", n),
            StackId::Text(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Create deployment
// ---------------------------------------------------------------------------

/// Reference to the review request (pull request) that triggered the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub platform: String,
    pub repository: String,
    pub number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Stack description as the service stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudStack {
    pub meta_id: String,
    pub meta_name: String,
    pub meta_description: String,
    pub meta_tags: Vec<String>,
    pub repository: String,
    pub path: String,
}

/// One stack entry of a deployment registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStackRequest {
    #[serde(flatten)]
    pub stack: CloudStack,
    pub commit_sha: String,
    pub deployment_command: String,
    pub deployment_url: String,
}

/// Body of the create-deployment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStacksPayloadRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_request: Option<ReviewRequest>,
    pub workdir: String,
    pub stacks: Vec<DeploymentStackRequest>,
}

/// One record of the create-deployment answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStackResponse {
    pub stack_id: StackId,
    #[serde(default)]
    pub meta_id: String,
}

// ---------------------------------------------------------------------------
// Update deployment
// ---------------------------------------------------------------------------

/// Status change for a single remote stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDeploymentStack {
    pub stack_id: StackId,
    pub status: RunStatus,
}

/// Body of the update-deployment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDeploymentStacks {
    pub stacks: Vec<UpdateDeploymentStack>,
}

impl UpdateDeploymentStacks {
    /// Payload carrying exactly one status change.
    pub fn single(stack_id: StackId, status: RunStatus) -> Self {
        Self {
            stacks: vec![UpdateDeploymentStack { stack_id, status }],
        }
    }
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

/// Drift check result for one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftStackPayloadRequest {
    pub stack: CloudStack,
    pub status: RunStatus,
    /// Command argv as executed.
    pub command: Vec<String>,
}
