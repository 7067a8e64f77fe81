//! Error types for stackrun-cloud

use thiserror::Error;

/// Errors that can occur while talking to the cloud deployment service
#[derive(Error, Debug)]
pub enum CloudError {
    /// Request did not complete in time
    #[error("cloud request timed out: {0}")]
    Timeout(String),

    /// Transport-level failure (connection refused, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Service answered with a non-success status code
    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// Response body could not be decoded
    #[error("failed to decode cloud response: {0}")]
    Decode(String),

    /// Response decoded fine but breaks the deployment protocol
    #[error("invalid cloud response: {0}")]
    Protocol(String),

    /// Status string not part of the closed status set
    #[error("unknown deployment status: {0:?}")]
    InvalidStatus(String),

    /// Client could not be constructed
    #[error("invalid cloud configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CloudError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CloudError::Timeout(err.to_string())
        } else if err.is_decode() {
            CloudError::Decode(err.to_string())
        } else if err.is_builder() {
            CloudError::Config(err.to_string())
        } else {
            CloudError::Http(err.to_string())
        }
    }
}

/// Result type for cloud operations
pub type Result<T> = std::result::Result<T, CloudError>;
