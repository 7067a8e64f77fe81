#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stackrun_cloud::fakes::{CreateBehavior, MemoryCloud};
use stackrun_core::{
    CancelHandle, CancelSignal, CloudRun, DeploymentMetadata, ExecContext, ExecOutcome,
    ProcessExecutor, RunConfig, RunOrchestrator, Stack,
};

/// A fake executor that:
/// - records which stacks were "run", in order
/// - answers with a scripted outcome per stack path (default: exit 0)
/// - optionally cancels the run right after a given stack
#[derive(Default)]
pub struct ScriptedExecutor {
    script: HashMap<String, ExecOutcome>,
    executed: Mutex<Vec<String>>,
    cancel_after: Option<(String, CancelHandle)>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exits(mut self, path: &str, code: i32) -> Self {
        self.script.insert(path.to_string(), ExecOutcome::Exited(code));
        self
    }

    pub fn not_found(mut self, path: &str) -> Self {
        self.script.insert(
            path.to_string(),
            ExecOutcome::SpawnFailed {
                reason: "non-existent-command: executable file not found".to_string(),
            },
        );
        self
    }

    pub fn cancel_after(mut self, path: &str, handle: CancelHandle) -> Self {
        self.cancel_after = Some((path.to_string(), handle));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessExecutor for ScriptedExecutor {
    async fn execute(&self, ctx: &ExecContext, _cancel: &CancelSignal) -> ExecOutcome {
        let path = ctx.stack.path.clone();
        self.executed.lock().unwrap().push(path.clone());

        if let Some((after, handle)) = &self.cancel_after {
            if *after == path {
                handle.cancel();
            }
        }

        self.script
            .get(&path)
            .cloned()
            .unwrap_or(ExecOutcome::Exited(0))
    }
}

/// Exec contexts for stacks whose id equals their path name.
pub fn stacks(names: &[&str]) -> Vec<ExecContext> {
    names
        .iter()
        .map(|name| {
            ExecContext::new(
                Stack::new(Path::new("/repo"), name).with_id(name),
                vec!["terraform".to_string(), "apply".to_string()],
            )
        })
        .collect()
}

pub fn cloud(behavior: CreateBehavior) -> Arc<MemoryCloud> {
    Arc::new(MemoryCloud::with_create_behavior(behavior))
}

/// Orchestrator wired to `executor` and `cloud`, with cloud sync requested.
pub fn orchestrator(
    executor: Arc<ScriptedExecutor>,
    cloud: Arc<MemoryCloud>,
    config: RunConfig,
) -> RunOrchestrator {
    let config = RunConfig {
        cloud_sync: true,
        workdir: "/".to_string(),
        ..config
    };
    RunOrchestrator::new(executor, config).with_cloud(
        CloudRun::new(cloud, "org-1", "run-1"),
        DeploymentMetadata::default(),
    )
}

pub fn reported(cloud: &MemoryCloud) -> Vec<(String, stackrun_core::RunStatus)> {
    cloud.reported()
}
