//! In-memory fake of the deployment service (testing only)
//!
//! `MemoryCloud` assigns numeric stack ids, records every call, and can be
//! told to misbehave in the ways the registrar and reporters must tolerate,
//! including never answering.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::CloudClient;
use crate::error::{CloudError, Result};
use crate::types::*;

/// How the fake answers `create_deployment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateBehavior {
    /// One record per requested stack, in request order.
    #[default]
    Normal,
    /// One record per requested stack, in reverse order.
    Reversed,
    /// Echo meta ids upper-cased.
    UpperCaseMetaIds,
    /// Fail with a transport error.
    TransportError,
    /// Omit the last record.
    DropLastRecord,
    /// Blank out the meta id of the first record.
    EmptyMetaId,
    /// Replace the meta id of the first record with one nobody asked for.
    UnknownMetaId,
    /// Never answer.
    Hang,
}

/// A recorded create-deployment call
#[derive(Debug, Clone)]
pub struct RecordedDeployment {
    pub organization: String,
    pub run_id: String,
    pub payload: DeploymentStacksPayloadRequest,
    pub assigned: Vec<(String, StackId)>,
}

/// A recorded update-deployment call
#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    pub organization: String,
    pub run_id: String,
    pub stack_id: StackId,
    pub status: RunStatus,
}

/// A recorded drift report
#[derive(Debug, Clone)]
pub struct RecordedDrift {
    pub organization: String,
    pub payload: DriftStackPayloadRequest,
}

#[derive(Debug, Default)]
struct CloudState {
    next_stack_id: i64,
    create_behavior: CreateBehavior,
    failing_updates: usize,
    hanging_updates: bool,
    deployments: Vec<RecordedDeployment>,
    updates: Vec<RecordedUpdate>,
    drifts: Vec<RecordedDrift>,
    create_calls: usize,
    update_calls: usize,
    drift_calls: usize,
}

/// How a status call (deployment update or drift report) is answered.
enum StatusAnswer {
    Accept,
    Fail,
    Hang,
}

impl CloudState {
    fn status_answer(&mut self) -> StatusAnswer {
        if self.hanging_updates {
            StatusAnswer::Hang
        } else if self.failing_updates > 0 {
            self.failing_updates -= 1;
            StatusAnswer::Fail
        } else {
            StatusAnswer::Accept
        }
    }
}

/// In-memory deployment service.
#[derive(Debug, Default)]
pub struct MemoryCloud {
    state: Mutex<CloudState>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_behavior(behavior: CreateBehavior) -> Self {
        let cloud = Self::default();
        cloud.state.lock().unwrap().create_behavior = behavior;
        cloud
    }

    /// Make the next `count` status calls (deployment updates and drift
    /// reports) fail with a transport error.
    pub fn fail_next_updates(&self, count: usize) {
        self.state.lock().unwrap().failing_updates = count;
    }

    /// While set, status calls never answer.
    pub fn hang_updates(&self, hang: bool) {
        self.state.lock().unwrap().hanging_updates = hang;
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn update_calls(&self) -> usize {
        self.state.lock().unwrap().update_calls
    }

    pub fn drift_calls(&self) -> usize {
        self.state.lock().unwrap().drift_calls
    }

    pub fn deployments(&self) -> Vec<RecordedDeployment> {
        self.state.lock().unwrap().deployments.clone()
    }

    /// Successfully applied status updates, in arrival order.
    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    /// Applied status updates keyed back to the meta id they were registered
    /// under, in arrival order.
    pub fn reported(&self) -> Vec<(String, RunStatus)> {
        let state = self.state.lock().unwrap();
        state
            .updates
            .iter()
            .map(|update| {
                let meta_id = state
                    .deployments
                    .iter()
                    .flat_map(|d| d.assigned.iter())
                    .find(|(_, id)| *id == update.stack_id)
                    .map(|(meta_id, _)| meta_id.clone())
                    .unwrap_or_else(|| format!("<unknown {}>", update.stack_id));
                (meta_id, update.status)
            })
            .collect()
    }

    /// Accepted drift reports, in arrival order.
    pub fn drifts(&self) -> Vec<RecordedDrift> {
        self.state.lock().unwrap().drifts.clone()
    }

    /// Accepted drift reports as `(meta_id, status)`, in arrival order.
    pub fn drifted(&self) -> Vec<(String, RunStatus)> {
        self.state
            .lock()
            .unwrap()
            .drifts
            .iter()
            .map(|d| (d.payload.stack.meta_id.clone(), d.payload.status))
            .collect()
    }
}

#[async_trait]
impl CloudClient for MemoryCloud {
    async fn create_deployment(
        &self,
        organization: &str,
        run_id: &str,
        payload: &DeploymentStacksPayloadRequest,
    ) -> Result<Vec<DeploymentStackResponse>> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.create_calls += 1;
            state.create_behavior
        };
        match behavior {
            CreateBehavior::Hang => std::future::pending::<()>().await,
            CreateBehavior::TransportError => {
                return Err(CloudError::Http("connection refused".to_string()))
            }
            _ => {}
        }

        let mut state = self.state.lock().unwrap();

        let mut assigned = Vec::with_capacity(payload.stacks.len());
        for request in &payload.stacks {
            state.next_stack_id += 1;
            assigned.push((
                request.stack.meta_id.clone(),
                StackId::Numeric(state.next_stack_id),
            ));
        }

        let mut records: Vec<DeploymentStackResponse> = assigned
            .iter()
            .map(|(meta_id, stack_id)| DeploymentStackResponse {
                stack_id: stack_id.clone(),
                meta_id: meta_id.clone(),
            })
            .collect();

        match state.create_behavior {
            CreateBehavior::Normal | CreateBehavior::TransportError | CreateBehavior::Hang => {}
            CreateBehavior::Reversed => records.reverse(),
            CreateBehavior::UpperCaseMetaIds => {
                for record in &mut records {
                    record.meta_id = record.meta_id.to_uppercase();
                }
            }
            CreateBehavior::DropLastRecord => {
                records.pop();
            }
            CreateBehavior::EmptyMetaId => {
                if let Some(first) = records.first_mut() {
                    first.meta_id.clear();
                }
            }
            CreateBehavior::UnknownMetaId => {
                if let Some(first) = records.first_mut() {
                    first.meta_id = "not-requested".to_string();
                }
            }
        }

        state.deployments.push(RecordedDeployment {
            organization: organization.to_string(),
            run_id: run_id.to_string(),
            payload: payload.clone(),
            assigned,
        });
        Ok(records)
    }

    async fn update_deployment_stacks(
        &self,
        organization: &str,
        run_id: &str,
        payload: &UpdateDeploymentStacks,
    ) -> Result<()> {
        let answer = {
            let mut state = self.state.lock().unwrap();
            state.update_calls += 1;
            state.status_answer()
        };
        match answer {
            StatusAnswer::Hang => std::future::pending::<()>().await,
            StatusAnswer::Fail => return Err(CloudError::Timeout("deadline exceeded".to_string())),
            StatusAnswer::Accept => {}
        }

        let mut state = self.state.lock().unwrap();
        for stack in &payload.stacks {
            state.updates.push(RecordedUpdate {
                organization: organization.to_string(),
                run_id: run_id.to_string(),
                stack_id: stack.stack_id.clone(),
                status: stack.status,
            });
        }
        Ok(())
    }

    async fn create_drift(
        &self,
        organization: &str,
        payload: &DriftStackPayloadRequest,
    ) -> Result<()> {
        let answer = {
            let mut state = self.state.lock().unwrap();
            state.drift_calls += 1;
            state.status_answer()
        };
        match answer {
            StatusAnswer::Hang => std::future::pending::<()>().await,
            StatusAnswer::Fail => return Err(CloudError::Http("connection reset".to_string())),
            StatusAnswer::Accept => {}
        }

        self.state.lock().unwrap().drifts.push(RecordedDrift {
            organization: organization.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}
