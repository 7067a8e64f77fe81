//! Cloud synchronisation of stack outcomes.
//!
//! A [`CloudRun`] carries everything sync needs for one run: the client, the
//! organization and run ids, the correlation table and the sync-enabled flag.
//! The [`DeploymentRegistrar`] writes the table once; the [`StatusReporter`]
//! only reads it. Drift checks bypass both and go through the
//! [`DriftReporter`]. Nothing here ever fails a run: every sync problem ends
//! up disabling sync or being logged.

pub mod correlation;
pub mod drift;
pub mod registrar;
pub mod reporter;

pub use correlation::CorrelationTable;
pub use drift::DriftReporter;
pub use registrar::{DeploymentBatch, DeploymentRegistrar};
pub use reporter::{ReportOutcome, StatusReporter};

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use stackrun_cloud::{CloudClient, CloudError, DEFAULT_CLOUD_TIMEOUT};
use tokio::time::Instant;
use tracing::warn;

use crate::executor::CancelSignal;

/// Once the run is canceled, remote calls get at most this long.
pub const CANCELED_CALL_GRACE: Duration = Duration::from_secs(5);

/// Run-scoped cloud sync state.
pub struct CloudRun {
    client: Arc<dyn CloudClient>,
    organization: String,
    run_id: String,
    call_timeout: Duration,
    enabled: bool,
    registered: bool,
    table: CorrelationTable,
    reported: HashSet<String>,
    cancel: CancelSignal,
}

impl CloudRun {
    pub fn new(client: Arc<dyn CloudClient>, organization: &str, run_id: &str) -> Self {
        Self {
            client,
            organization: organization.to_string(),
            run_id: run_id.to_string(),
            call_timeout: DEFAULT_CLOUD_TIMEOUT,
            enabled: true,
            registered: false,
            table: CorrelationTable::default(),
            reported: HashSet::new(),
            cancel: CancelSignal::never(),
        }
    }

    /// Bound applied to every remote call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Cut remote calls short once `cancel` fires.
    pub fn set_cancel(&mut self, cancel: CancelSignal) {
        self.cancel = cancel;
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn correlation(&self) -> &CorrelationTable {
        &self.table
    }

    /// Turn sync off for the rest of the run. The table is dropped with it.
    pub fn disable(&mut self, reason: &str) {
        if self.enabled {
            warn!(
                organization = %self.organization,
                reason,
                "disabling cloud features for this run"
            );
        }
        self.enabled = false;
        self.table = CorrelationTable::default();
    }
}

/// Bound a remote call by `limit`, shortened to [`CANCELED_CALL_GRACE`] once
/// `cancel` fires. Expiry is reported like any transport error.
async fn bounded<T, F>(limit: Duration, cancel: &CancelSignal, call: F) -> Result<T, CloudError>
where
    F: Future<Output = Result<T, CloudError>>,
{
    let deadline = Instant::now() + limit;
    tokio::pin!(call);

    if !cancel.is_cancelled() {
        tokio::select! {
            result = tokio::time::timeout_at(deadline, &mut call) => {
                return result.unwrap_or_else(|_| {
                    Err(CloudError::Timeout(format!("no answer within {:?}", limit)))
                });
            }
            _ = cancel.cancelled() => {}
        }
    }

    let cut = deadline.min(Instant::now() + CANCELED_CALL_GRACE);
    match tokio::time::timeout_at(cut, call).await {
        Ok(result) => result,
        Err(_) => Err(CloudError::Timeout(
            "no answer after the run was canceled".to_string(),
        )),
    }
}

impl std::fmt::Debug for CloudRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudRun")
            .field("organization", &self.organization)
            .field("run_id", &self.run_id)
            .field("enabled", &self.enabled)
            .field("correlated", &self.table.len())
            .finish()
    }
}
