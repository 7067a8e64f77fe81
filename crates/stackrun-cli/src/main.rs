//! stackrun - run a command across stacks with cloud deployment sync
//!
//! ## Commands
//!
//! - `run`: execute a command in every stack of a manifest, in order
//! - `list`: show the manifest's stacks in execution order

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use stackrun_cloud::{CloudConfig, HttpCloudClient, ReviewRequest};
use stackrun_core::stack::{project_path, project_relative};
use stackrun_core::{
    cancel_pair, init_tracing, CloudRun, DeploymentMetadata, LogFormat, RunConfig, RunMode,
    RunOrchestrator, RunOutcome, RunStatus, SchedulingPolicy, StackManifest,
    TokioProcessExecutor,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "stackrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run commands across stacks and sync deployments", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command in every stack of the manifest, in order
    Run(RunArgs),

    /// List the manifest's stacks in execution order
    List {
        /// Ordered stack manifest (JSON)
        #[arg(long, env = "STACKRUN_MANIFEST", default_value = "stacks.json")]
        manifest: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Ordered stack manifest (JSON)
    #[arg(long, env = "STACKRUN_MANIFEST", default_value = "stacks.json")]
    manifest: PathBuf,

    /// Project root the manifest paths are relative to
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Keep running the remaining stacks after a failure
    #[arg(long)]
    continue_on_error: bool,

    /// Sync deployment status of each stack with the cloud
    #[arg(long)]
    cloud_sync_deployment: bool,

    /// Treat exit code 2 as drift and sync drift status with the cloud
    #[arg(long, conflicts_with = "cloud_sync_deployment")]
    cloud_sync_drift_status: bool,

    /// Cloud service base URL
    #[arg(long, env = "STACKRUN_CLOUD_URL")]
    cloud_url: Option<String>,

    /// Bearer token for the cloud service
    #[arg(long, env = "STACKRUN_CLOUD_TOKEN", hide_env_values = true)]
    cloud_token: Option<String>,

    /// Cloud organization id
    #[arg(long, env = "STACKRUN_CLOUD_ORG")]
    cloud_org: Option<String>,

    /// Timeout for each cloud call, in seconds
    #[arg(long, env = "STACKRUN_CLOUD_TIMEOUT", default_value_t = 60)]
    cloud_timeout_secs: u64,

    /// Review request that triggered the run, e.g. github:owner/repo#42
    #[arg(long, env = "STACKRUN_REVIEW_REQUEST", value_parser = parse_review_request)]
    review_request: Option<ReviewRequest>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Command to run in each stack (stacks may override it)
    #[arg(last = true)]
    command: Vec<String>,
}

impl RunArgs {
    fn sync_requested(&self) -> bool {
        self.cloud_sync_deployment || self.cloud_sync_drift_status
    }

    fn mode(&self) -> RunMode {
        if self.cloud_sync_drift_status {
            RunMode::DriftCheck
        } else {
            RunMode::Deployment
        }
    }

    fn policy(&self) -> SchedulingPolicy {
        if self.continue_on_error {
            SchedulingPolicy::ContinueOnError
        } else {
            SchedulingPolicy::FailFast
        }
    }
}

/// Parse `<platform>:<owner>/<repo>#<number>`.
fn parse_review_request(value: &str) -> std::result::Result<ReviewRequest, String> {
    let (platform, rest) = value
        .split_once(':')
        .ok_or_else(|| format!("expected <platform>:<repository>#<number>, got {:?}", value))?;
    let (repository, number) = rest
        .rsplit_once('#')
        .ok_or_else(|| format!("missing #<number> in {:?}", value))?;
    if platform.is_empty() || repository.is_empty() {
        return Err(format!("empty platform or repository in {:?}", value));
    }
    let number = number
        .parse::<u64>()
        .map_err(|e| format!("invalid review request number {:?}: {}", number, e))?;

    Ok(ReviewRequest {
        platform: platform.to_string(),
        repository: repository.to_string(),
        number,
        title: None,
        url: None,
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::List { manifest } => cmd_list(&manifest),
    }
}

async fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("Invalid project root: {:?}", args.root))?;
    let manifest = StackManifest::load(&args.manifest).context("Failed to load stack manifest")?;
    let contexts = manifest
        .into_exec_contexts(&root, &args.command)
        .context("Invalid stack manifest")?;

    let cwd = std::env::current_dir()
        .and_then(|dir| dir.canonicalize())
        .context("Failed to resolve working directory")?;

    let config = RunConfig {
        mode: args.mode(),
        policy: args.policy(),
        cloud_sync: args.sync_requested(),
        review_request: args.review_request.clone(),
        workdir: project_relative(&root, &cwd),
    };

    let executor = Arc::new(TokioProcessExecutor::new());
    let mut orchestrator = RunOrchestrator::new(executor, config);
    let run_id = uuid::Uuid::new_v4().to_string();
    if let Some(cloud) = connect_cloud(&args, &run_id) {
        orchestrator = orchestrator.with_cloud(cloud, DeploymentMetadata::detect(&root));
    }

    let (handle, signal) = cancel_pair();
    let handle = Arc::new(handle);
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, canceling run");
                handle.cancel();
            }
        });
    }
    if let Some(secs) = args.timeout_secs {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(timeout_secs = secs, "run timeout reached, canceling run");
            handle.cancel();
        });
    }

    println!("Running {} stack(s) from {:?}", contexts.len(), args.manifest);
    println!("Run ID: {}", run_id);
    println!();

    let outcome = orchestrator
        .run(&contexts, &signal)
        .await
        .context("Run rejected")?;

    print_summary(&outcome);
    Ok(ExitCode::from(outcome.exit_code()))
}

/// Build the cloud side of the run, or `None` when sync is off or cannot be
/// configured.
fn connect_cloud(args: &RunArgs, run_id: &str) -> Option<CloudRun> {
    if !args.sync_requested() {
        return None;
    }

    let (Some(url), Some(org)) = (args.cloud_url.as_deref(), args.cloud_org.as_deref()) else {
        warn!("cloud sync requested but no cloud URL or organization configured; disabling cloud features");
        return None;
    };

    let timeout = Duration::from_secs(args.cloud_timeout_secs);
    let mut config = CloudConfig::new(url, org).with_timeout(timeout);
    if let Some(token) = args.cloud_token.as_deref() {
        config = config.with_token(token);
    }

    match HttpCloudClient::new(config) {
        Ok(client) => {
            info!(organization = %org, run_id, "cloud sync enabled");
            Some(CloudRun::new(Arc::new(client), org, run_id).with_call_timeout(timeout))
        }
        Err(e) => {
            warn!(error = %e, "failed to set up cloud client; disabling cloud features");
            None
        }
    }
}

fn print_summary(outcome: &RunOutcome) {
    println!();
    for result in &outcome.results {
        let mark = match result.status {
            RunStatus::Ok => "✓",
            RunStatus::Drifted => "~",
            RunStatus::Failed | RunStatus::Canceled => "✗",
        };
        let synced = if result.was_reported() { " [synced]" } else { "" };
        println!(
            "  {} {:<8} {} ({}ms){}",
            mark,
            result.status,
            result.stack.path,
            result.duration.as_millis(),
            synced
        );
    }
    println!();
    println!(
        "Stacks: {} (ok: {}, failed: {}, canceled: {}, drifted: {})",
        outcome.results.len(),
        outcome.count(RunStatus::Ok),
        outcome.count(RunStatus::Failed),
        outcome.count(RunStatus::Canceled),
        outcome.count(RunStatus::Drifted),
    );
    println!(
        "Cloud sync: {}",
        if outcome.sync_enabled { "enabled" } else { "disabled" }
    );
    println!("Duration: {}ms", outcome.duration.as_millis());
}

fn cmd_list(manifest: &Path) -> Result<ExitCode> {
    let manifest = StackManifest::load(manifest).context("Failed to load stack manifest")?;
    if manifest.stacks.is_empty() {
        println!("No stacks.");
        return Ok(ExitCode::SUCCESS);
    }
    for entry in &manifest.stacks {
        println!(
            "{}\t{}",
            project_path(&entry.path),
            entry.id.as_deref().unwrap_or("-")
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(args).expect("parse failed");
        match cli.command {
            Commands::Run(args) => args,
            Commands::List { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_defaults() {
        let args = parse(&["stackrun", "run", "--", "terraform", "apply"]);
        assert_eq!(args.command, vec!["terraform", "apply"]);
        assert_eq!(args.cloud_timeout_secs, 60);
        assert!(!args.sync_requested());
        assert_eq!(args.mode(), RunMode::Deployment);
        assert_eq!(args.policy(), SchedulingPolicy::FailFast);
    }

    #[test]
    fn test_drift_flag_selects_drift_mode() {
        let args = parse(&[
            "stackrun",
            "run",
            "--cloud-sync-drift-status",
            "--continue-on-error",
            "--",
            "terraform",
            "plan",
            "-detailed-exitcode",
        ]);
        assert!(args.sync_requested());
        assert_eq!(args.mode(), RunMode::DriftCheck);
        assert_eq!(args.policy(), SchedulingPolicy::ContinueOnError);
    }

    #[test]
    fn test_sync_flags_conflict() {
        let result = Cli::try_parse_from([
            "stackrun",
            "run",
            "--cloud-sync-deployment",
            "--cloud-sync-drift-status",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_without_url_is_disabled() {
        let mut args = parse(&["stackrun", "run", "--cloud-sync-deployment", "--", "true"]);
        args.cloud_url = None;
        args.cloud_org = None;
        assert!(connect_cloud(&args, "run-1").is_none());
    }

    #[test]
    fn test_parse_review_request() {
        let review = parse_review_request("github:acme/infra#42").unwrap();
        assert_eq!(review.platform, "github");
        assert_eq!(review.repository, "acme/infra");
        assert_eq!(review.number, 42);

        assert!(parse_review_request("acme/infra#42").is_err());
        assert!(parse_review_request("github:acme/infra").is_err());
        assert!(parse_review_request("github:acme/infra#x").is_err());
    }
}
