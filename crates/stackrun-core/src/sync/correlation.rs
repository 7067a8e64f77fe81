//! Meta id to remote stack id correlation.

use std::collections::{HashMap, HashSet};

use stackrun_cloud::{CloudError, DeploymentStackResponse, StackId};

/// Lower-cased meta id → remote stack id, built once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationTable {
    ids: HashMap<String, StackId>,
}

impl CorrelationTable {
    /// Build the table from a create-deployment answer.
    ///
    /// `requested` holds the lower-cased meta ids sent in the batch. Records
    /// are matched by meta id, never by position. Either every requested
    /// stack gets exactly one remote id or the whole answer is rejected.
    pub fn correlate(
        requested: &[String],
        records: &[DeploymentStackResponse],
    ) -> Result<Self, CloudError> {
        if records.len() != requested.len() {
            return Err(CloudError::Protocol(format!(
                "the backend responded with an invalid number of stacks in the deployment: {} instead of {}",
                records.len(),
                requested.len()
            )));
        }

        let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
        let mut ids = HashMap::with_capacity(records.len());

        for record in records {
            let meta_id = record.meta_id.trim().to_lowercase();
            if meta_id.is_empty() {
                return Err(CloudError::Protocol(
                    "backend returned empty meta_id".to_string(),
                ));
            }
            if !wanted.contains(meta_id.as_str()) {
                return Err(CloudError::Protocol(format!(
                    "backend returned meta_id {:?} that was not part of the deployment",
                    meta_id
                )));
            }
            if ids.insert(meta_id.clone(), record.stack_id.clone()).is_some() {
                return Err(CloudError::Protocol(format!(
                    "backend returned meta_id {:?} more than once",
                    meta_id
                )));
            }
        }

        Ok(Self { ids })
    }

    /// Remote id for a meta id, compared case-insensitively.
    pub fn stack_id(&self, meta_id: &str) -> Option<&StackId> {
        self.ids.get(&meta_id.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
