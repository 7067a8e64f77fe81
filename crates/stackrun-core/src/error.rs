//! Error taxonomy for the run orchestrator.
//!
//! Only selection and loading problems surface as errors. Execution failures
//! become a stack's [`RunStatus`](crate::RunStatus) and sync failures are
//! absorbed by the cloud run context.

/// Orchestrator errors.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("all stacks must have ids when cloud sync is enabled; missing in: {}", paths.join(", "))]
    StacksWithoutId { paths: Vec<String> },

    #[error("stack id {id:?} is declared by more than one stack: {}", paths.join(", "))]
    DuplicateStackId { id: String, paths: Vec<String> },

    #[error("invalid stack manifest: {0}")]
    Manifest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
