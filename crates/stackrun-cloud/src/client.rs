//! Deployment-sync client.
//!
//! [`CloudClient`] is the seam the orchestrator talks to. [`HttpCloudClient`]
//! implements it over HTTP+JSON; `fakes::MemoryCloud` implements it in memory.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::types::{
    DeploymentStackResponse, DeploymentStacksPayloadRequest, DriftStackPayloadRequest,
    UpdateDeploymentStacks,
};

/// Default bound for every remote call.
pub const DEFAULT_CLOUD_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote deployment service.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Register all stacks of a run in one round trip.
    async fn create_deployment(
        &self,
        organization: &str,
        run_id: &str,
        payload: &DeploymentStacksPayloadRequest,
    ) -> Result<Vec<DeploymentStackResponse>>;

    /// Move remote stacks to a new status.
    async fn update_deployment_stacks(
        &self,
        organization: &str,
        run_id: &str,
        payload: &UpdateDeploymentStacks,
    ) -> Result<()>;

    /// Record the drift check result of one stack.
    async fn create_drift(
        &self,
        organization: &str,
        payload: &DriftStackPayloadRequest,
    ) -> Result<()>;
}

/// Connection settings for the deployment service
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Service base URL, without trailing slash
    pub base_url: String,
    /// Organization the runs belong to
    pub organization: String,
    /// Bearer token (optional for local test servers)
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl CloudConfig {
    pub fn new(base_url: &str, organization: &str) -> Self {
        CloudConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            organization: organization.to_string(),
            token: None,
            timeout: DEFAULT_CLOUD_TIMEOUT,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP implementation of [`CloudClient`]
pub struct HttpCloudClient {
    config: CloudConfig,
    http_client: reqwest::Client,
}

impl HttpCloudClient {
    pub fn new(config: CloudConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("stackrun/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(HttpCloudClient {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    fn deployment_stacks_url(&self, organization: &str, run_id: &str) -> String {
        format!(
            "{}/v1/deployments/{}/{}/stacks",
            self.config.base_url, organization, run_id
        )
    }

    fn drifts_url(&self, organization: &str) -> String {
        format!("{}/v1/drifts/{}", self.config.base_url, organization)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<B, T>(&self, method: reqwest::Method, url: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(method, url, body).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send<B>(&self, method: reqwest::Method, url: &str, body: &B) -> Result<reqwest::Response>
    where
        B: serde::Serialize + ?Sized,
    {
        debug!(%method, url, "cloud request");
        let response = self.request(method, url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CloudClient for HttpCloudClient {
    async fn create_deployment(
        &self,
        organization: &str,
        run_id: &str,
        payload: &DeploymentStacksPayloadRequest,
    ) -> Result<Vec<DeploymentStackResponse>> {
        let url = self.deployment_stacks_url(organization, run_id);
        self.send_json(reqwest::Method::POST, &url, payload).await
    }

    async fn update_deployment_stacks(
        &self,
        organization: &str,
        run_id: &str,
        payload: &UpdateDeploymentStacks,
    ) -> Result<()> {
        let url = self.deployment_stacks_url(organization, run_id);
        self.send(reqwest::Method::PATCH, &url, payload).await?;
        Ok(())
    }

    async fn create_drift(
        &self,
        organization: &str,
        payload: &DriftStackPayloadRequest,
    ) -> Result<()> {
        let url = self.drifts_url(organization);
        self.send(reqwest::Method::POST, &url, payload).await?;
        Ok(())
    }
}
