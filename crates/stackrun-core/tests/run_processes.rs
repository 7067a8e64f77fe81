//! Runs with real child processes in temporary stack directories.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use stackrun_cloud::fakes::MemoryCloud;
use stackrun_core::{
    CancelSignal, CloudRun, DeploymentMetadata, ExecContext, RunConfig, RunMode,
    RunOrchestrator, RunStatus, SchedulingPolicy, Stack, TokioProcessExecutor,
};
use tempfile::TempDir;

/// Create `names` as stack directories under a fresh root.
fn project(names: &[&str]) -> TempDir {
    let root = TempDir::new().expect("tempdir");
    for name in names {
        fs::create_dir_all(root.path().join(name)).expect("create stack dir");
    }
    root
}

fn contexts(root: &Path, names: &[&str], command: &[&str]) -> Vec<ExecContext> {
    names
        .iter()
        .map(|name| {
            ExecContext::new(
                Stack::new(root, name).with_id(name),
                command.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

fn synced(cloud: &Arc<MemoryCloud>, config: RunConfig) -> RunOrchestrator {
    RunOrchestrator::new(
        Arc::new(TokioProcessExecutor::quiet()),
        RunConfig {
            cloud_sync: true,
            workdir: "/".to_string(),
            ..config
        },
    )
    .with_cloud(
        CloudRun::new(cloud.clone(), "org-1", "run-1"),
        DeploymentMetadata::default(),
    )
}

/// Test: failed command with continue-on-error reports both stacks
#[tokio::test]
async fn test_failed_cmd_and_continue_on_error() {
    let root = project(&["s1", "s2"]);
    fs::write(root.path().join("s2").join("test.txt"), "test").expect("write");

    let cloud = Arc::new(MemoryCloud::new());
    let mut run = synced(
        &cloud,
        RunConfig {
            policy: SchedulingPolicy::ContinueOnError,
            ..RunConfig::default()
        },
    );

    let outcome = run
        .run(
            &contexts(root.path(), &["s1", "s2"], &["cat", "test.txt"]),
            &CancelSignal::never(),
        )
        .await
        .expect("run failed");

    assert_eq!(
        cloud.reported(),
        vec![
            ("s1".to_string(), RunStatus::Failed),
            ("s2".to_string(), RunStatus::Ok),
        ]
    );
    assert_eq!(outcome.exit_code(), 1);

    let sent = &cloud.deployments()[0].payload.stacks;
    assert_eq!(sent[0].deployment_command, "cat test.txt");
}

/// Test: non-existent command under fail-fast reports only the first stack
#[tokio::test]
async fn test_command_not_found_fail_fast() {
    let root = project(&["s1", "s2"]);
    let cloud = Arc::new(MemoryCloud::new());
    let mut run = synced(&cloud, RunConfig::default());

    let outcome = run
        .run(
            &contexts(root.path(), &["s1", "s2"], &["non-existent-command"]),
            &CancelSignal::never(),
        )
        .await
        .expect("run failed");

    assert_eq!(cloud.reported(), vec![("s1".to_string(), RunStatus::Failed)]);
    assert_eq!(outcome.skipped().count(), 1);
}

/// Test: exit code 2 in drift mode is reported as drift
#[tokio::test]
async fn test_drift_exit_code_with_real_processes() {
    let root = project(&["s1", "s2"]);
    let cloud = Arc::new(MemoryCloud::new());
    let mut run = synced(
        &cloud,
        RunConfig {
            mode: RunMode::DriftCheck,
            ..RunConfig::default()
        },
    );

    let outcome = run
        .run(
            &contexts(root.path(), &["s1", "s2"], &["sh", "-c", "exit 2"]),
            &CancelSignal::never(),
        )
        .await
        .expect("run failed");

    assert_eq!(
        cloud.drifted(),
        vec![
            ("s1".to_string(), RunStatus::Drifted),
            ("s2".to_string(), RunStatus::Drifted),
        ]
    );
    assert_eq!(cloud.create_calls(), 0);
    assert_eq!(outcome.exit_code(), 0);
}

/// Test: drift check with a failing command and continue-on-error posts both stacks
#[tokio::test]
async fn test_drift_failed_cmd_and_continue_on_error() {
    let root = project(&["s1", "s2"]);
    fs::write(root.path().join("s2").join("test.txt"), "test").expect("write");

    let cloud = Arc::new(MemoryCloud::new());
    let mut run = synced(
        &cloud,
        RunConfig {
            mode: RunMode::DriftCheck,
            policy: SchedulingPolicy::ContinueOnError,
            ..RunConfig::default()
        },
    );

    let outcome = run
        .run(
            &contexts(root.path(), &["s1", "s2"], &["cat", "test.txt"]),
            &CancelSignal::never(),
        )
        .await
        .expect("run failed");

    assert_eq!(
        cloud.drifted(),
        vec![
            ("s1".to_string(), RunStatus::Failed),
            ("s2".to_string(), RunStatus::Ok),
        ]
    );
    assert_eq!(outcome.exit_code(), 1);

    let drifts = cloud.drifts();
    assert_eq!(drifts[0].payload.command, vec!["cat", "test.txt"]);
    assert_eq!(drifts[1].payload.stack.path, "/s2");
}

/// Test: commands run inside each stack's own directory
#[tokio::test]
async fn test_commands_run_in_stack_directory() {
    let root = project(&["a", "b"]);
    let mut run = RunOrchestrator::new(
        Arc::new(TokioProcessExecutor::quiet()),
        RunConfig::default(),
    );

    let outcome = run
        .run(
            &contexts(root.path(), &["a", "b"], &["touch", "ran"]),
            &CancelSignal::never(),
        )
        .await
        .expect("run failed");

    assert!(outcome.is_clean());
    assert!(root.path().join("a").join("ran").exists());
    assert!(root.path().join("b").join("ran").exists());
    assert!(!root.path().join("ran").exists());
}
