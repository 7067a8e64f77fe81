//! Ordered stack manifest.
//!
//! Stand-in for the stack selector: a JSON file listing the stacks of a run
//! in execution order.
//!
//! ```json
//! {
//!   "stacks": [
//!     { "id": "vpc", "path": "network/vpc", "tags": ["aws"] },
//!     { "id": "app", "path": "apps/web", "command": ["terraform", "plan"] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{OrchestratorError, Result};
use crate::stack::{ExecContext, Stack};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackManifest {
    pub stacks: Vec<ManifestStack>,
}

/// One manifest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestStack {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub path: String,
    /// Overrides the run command for this stack.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

impl StackManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Manifest(format!("reading {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Resolve entries against the project `root`.
    ///
    /// Entries without their own command use `default_command`; an entry left
    /// with no command at all is rejected.
    pub fn into_exec_contexts(
        self,
        root: &Path,
        default_command: &[String],
    ) -> Result<Vec<ExecContext>> {
        self.stacks
            .into_iter()
            .map(|entry| {
                let mut stack = Stack::new(root, &entry.path)
                    .with_description(&entry.description)
                    .with_tags(entry.tags);
                stack.id = entry.id;
                if let Some(name) = entry.name {
                    stack = stack.with_name(&name);
                }

                let command = entry
                    .command
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| default_command.to_vec());
                if command.is_empty() {
                    return Err(OrchestratorError::Manifest(format!(
                        "no command to run for stack {}",
                        stack.path
                    )));
                }
                Ok(ExecContext::new(stack, command))
            })
            .collect()
    }
}
