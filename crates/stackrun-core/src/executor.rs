//! Stack command execution and run cancellation.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::stack::ExecContext;
use crate::status::ExecOutcome;

/// Create a linked cancel handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Requests cancellation of a run.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes cancellation of a run.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = cancel_pair();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Runs one stack's command.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Execute `ctx` and report how it ended. Must stop promptly once
    /// `cancel` fires.
    async fn execute(&self, ctx: &ExecContext, cancel: &CancelSignal) -> ExecOutcome;
}

/// Executes commands as child processes sharing the parent's stdio.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessExecutor {
    quiet: bool,
}

impl TokioProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard child output instead of inheriting the terminal.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
        }
    }

    fn stdio(&self) -> Stdio {
        if self.quiet {
            Stdio::null()
        } else {
            Stdio::inherit()
        }
    }
}

#[async_trait]
impl ProcessExecutor for TokioProcessExecutor {
    async fn execute(&self, ctx: &ExecContext, cancel: &CancelSignal) -> ExecOutcome {
        let stack = &ctx.stack.path;

        let Some((program, args)) = ctx.command.split_first() else {
            return ExecOutcome::SpawnFailed {
                reason: "empty command".to_string(),
            };
        };

        debug!(stack = %stack, cmd = %ctx.command_line(), dir = ?ctx.stack.host_dir, "spawning stack command");

        let spawned = Command::new(program)
            .args(args)
            .current_dir(&ctx.stack.host_dir)
            .stdin(Stdio::null())
            .stdout(self.stdio())
            .stderr(self.stdio())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound && !ctx.stack.host_dir.is_dir() => {
                return ExecOutcome::SpawnFailed {
                    reason: format!("stack directory {:?} does not exist", ctx.stack.host_dir),
                };
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return ExecOutcome::SpawnFailed {
                    reason: format!("{}: executable file not found", program),
                };
            }
            Err(e) => {
                return ExecOutcome::SpawnFailed {
                    reason: format!("{}: {}", program, e),
                };
            }
        };

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => match status.code() {
                    Some(code) => ExecOutcome::Exited(code),
                    None => ExecOutcome::Signaled,
                },
                Err(e) => {
                    warn!(stack = %stack, error = %e, "failed waiting for stack command");
                    ExecOutcome::Signaled
                }
            },
            _ = cancel.cancelled() => {
                info!(stack = %stack, "cancellation requested; killing stack command");
                if let Err(e) = child.kill().await {
                    warn!(stack = %stack, error = %e, "failed to kill stack command");
                }
                ExecOutcome::Interrupted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use std::time::{Duration, Instant};

    fn ctx_in(dir: &std::path::Path, command: &[&str]) -> ExecContext {
        ExecContext::new(
            Stack::new(dir, "/"),
            command.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_execute_success() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = TokioProcessExecutor::quiet()
            .execute(&ctx_in(dir.path(), &["true"]), &CancelSignal::never())
            .await;
        assert_eq!(outcome, ExecOutcome::Exited(0));
    }

    #[tokio::test]
    async fn test_execute_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = TokioProcessExecutor::quiet()
            .execute(&ctx_in(dir.path(), &["sh", "-c", "exit 2"]), &CancelSignal::never())
            .await;
        assert_eq!(outcome, ExecOutcome::Exited(2));
    }

    #[tokio::test]
    async fn test_execute_runs_in_stack_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let outcome = TokioProcessExecutor::quiet()
            .execute(
                &ctx_in(dir.path(), &["sh", "-c", "test -f marker.txt"]),
                &CancelSignal::never(),
            )
            .await;
        assert_eq!(outcome, ExecOutcome::Exited(0));
    }

    #[tokio::test]
    async fn test_execute_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = TokioProcessExecutor::quiet()
            .execute(
                &ctx_in(dir.path(), &["non-existent-command"]),
                &CancelSignal::never(),
            )
            .await;
        match outcome {
            ExecOutcome::SpawnFailed { reason } => {
                assert!(reason.contains("executable file not found"), "{reason}")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = TokioProcessExecutor::quiet()
            .execute(&ctx_in(dir.path(), &[]), &CancelSignal::never())
            .await;
        assert!(matches!(outcome, ExecOutcome::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_kills_running_command() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, signal) = cancel_pair();

        let started = Instant::now();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let outcome = TokioProcessExecutor::quiet()
            .execute(&ctx_in(dir.path(), &["sleep", "30"]), &signal)
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome, ExecOutcome::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancel_signal_states() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
        // Already-fired signal resolves immediately.
        signal.cancelled().await;

        assert!(!CancelSignal::never().is_cancelled());
    }
}
