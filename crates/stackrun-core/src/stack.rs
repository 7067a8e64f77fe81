//! Stack data model and selection validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{OrchestratorError, Result};

/// An independently executable project unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// User-declared identifier, compared case-insensitively.
    pub id: Option<String>,

    pub name: String,

    pub description: String,

    /// Display-only tags, order preserved.
    pub tags: Vec<String>,

    /// Project-relative path, always starting with `/`.
    pub path: String,

    /// Absolute directory the stack's command runs in.
    pub host_dir: PathBuf,
}

impl Stack {
    /// Stack rooted at `root` with the given project path. Name defaults to
    /// the last path component.
    pub fn new(root: &Path, path: &str) -> Self {
        let path = project_path(path);
        let name = path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or("/")
            .to_string();
        let host_dir = root.join(path.trim_start_matches('/'));

        Self {
            id: None,
            name,
            description: String::new(),
            tags: Vec::new(),
            path,
            host_dir,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Lower-cased meta id, the key used for correlation. `None` when the
    /// stack declares no (or an empty) id.
    pub fn meta_id(&self) -> Option<String> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_lowercase)
    }
}

/// A stack paired with the command to run in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecContext {
    pub stack: Stack,
    pub command: Vec<String>,
}

impl ExecContext {
    pub fn new(stack: Stack, command: Vec<String>) -> Self {
        Self { stack, command }
    }

    /// Command flattened to a single line, as registered with the cloud.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Reject selections the cloud protocol cannot correlate.
///
/// Duplicate ids (case-insensitive) are always rejected; stacks without an
/// id only when `require_ids` is set.
pub fn validate_selection(contexts: &[ExecContext], require_ids: bool) -> Result<()> {
    if require_ids {
        let missing: Vec<String> = contexts
            .iter()
            .filter(|c| c.stack.meta_id().is_none())
            .map(|c| c.stack.path.clone())
            .collect();
        if !missing.is_empty() {
            return Err(OrchestratorError::StacksWithoutId { paths: missing });
        }
    }

    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for ctx in contexts {
        if let Some(meta_id) = ctx.stack.meta_id() {
            seen.entry(meta_id).or_default().push(ctx.stack.path.clone());
        }
    }
    if let Some((id, paths)) = seen.into_iter().find(|(_, paths)| paths.len() > 1) {
        return Err(OrchestratorError::DuplicateStackId { id, paths });
    }

    Ok(())
}

/// Normalise a project path: forward slashes, leading `/`, no `.` segments
/// and no trailing slash.
pub fn project_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

/// Express `dir` relative to the project `root` as a project path.
///
/// Directories outside the root map to `/`.
pub fn project_relative(root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) => {
            let segments: Vec<String> = rel
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            format!("/{}", segments.join("/"))
        }
        Err(_) => "/".to_string(),
    }
}
