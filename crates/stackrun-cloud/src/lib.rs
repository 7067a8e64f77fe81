//! stackrun-cloud - deployment-sync protocol for stackrun
//!
//! Wire types for deployment and drift sync, the [`CloudClient`] seam, an
//! HTTP implementation backed by `reqwest`, and an in-memory fake for tests.

pub mod client;
pub mod error;
pub mod fakes;
pub mod types;

pub use client::{CloudClient, CloudConfig, HttpCloudClient, DEFAULT_CLOUD_TIMEOUT};
pub use error::{CloudError, Result};
pub use types::{
    CloudStack, DeploymentStackRequest, DeploymentStackResponse, DeploymentStacksPayloadRequest,
    DriftStackPayloadRequest, ReviewRequest, RunStatus, StackId, UpdateDeploymentStack, UpdateDeploymentStacks,
};
