//! In-memory inventory for driving the rebalancer in tests.
//!
//! Instances live in per-cluster vectors. Every trait call is recorded so
//! tests can assert on exactly which remote calls a run made. While an
//! instance is draining, each poll removes `drain_step` tasks from it, which
//! stands in for the orchestrator moving work elsewhere.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use taskbalancer_core::{DrainHandle, InstanceRecord, InstanceStatus, Inventory, InventoryError};

/// A recorded inventory call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListClusters,
    ListInstances { cluster: String, status: InstanceStatus },
    GetInstance { cluster: String, handle: String },
    SetStatus { cluster: String, handle: String, status: InstanceStatus },
}

#[derive(Default)]
struct State {
    clusters: Vec<String>,
    instances: HashMap<String, Vec<InstanceRecord>>,
    calls: Vec<Call>,
    failing_clusters: Vec<String>,
    failing_polls: bool,
    reactivate_on_poll: bool,
    drain_step: u32,
}

#[derive(Default)]
pub struct FakeInventory {
    state: Mutex<State>,
}

pub fn instance(id: &str, running: u32) -> InstanceRecord {
    InstanceRecord {
        instance_id: id.to_string(),
        handle: DrainHandle::new(format!("arn:aws:ecs:eu-west-1:000:container-instance/{}", id)),
        status: InstanceStatus::Active,
        running_tasks: running,
        pending_tasks: 0,
    }
}

impl FakeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fake with a single cluster whose instances carry `tasks`
    pub fn with_cluster(cluster: &str, tasks: &[u32]) -> Self {
        let fake = Self::new();
        fake.add_cluster(cluster, tasks);
        fake
    }

    pub fn add_cluster(&self, cluster: &str, tasks: &[u32]) {
        let ids = ["i-aaaaa", "i-bbbbb", "i-ccccc", "i-ddddd", "i-eeeee", "i-fffff"];
        let records = tasks
            .iter()
            .enumerate()
            .map(|(n, &t)| {
                let id = ids
                    .get(n)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("i-{:05}", n));
                instance(&id, t)
            })
            .collect();
        self.add_instances(cluster, records);
    }

    pub fn add_instances(&self, cluster: &str, records: Vec<InstanceRecord>) {
        let mut state = self.state.lock().unwrap();
        state.clusters.push(cluster.to_string());
        state.instances.insert(cluster.to_string(), records);
    }

    /// Tasks removed from a draining instance on every poll
    pub fn set_drain_step(&self, step: u32) {
        self.state.lock().unwrap().drain_step = step;
    }

    /// Every call touching `cluster` fails with an API error
    pub fn fail_cluster(&self, cluster: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_clusters
            .push(cluster.to_string());
    }

    /// Polls of a draining instance fail; status updates still succeed
    pub fn fail_polls(&self) {
        self.state.lock().unwrap().failing_polls = true;
    }

    /// The first poll of a draining instance finds it ACTIVE again, as if
    /// another operator had re-activated it
    pub fn reactivate_on_poll(&self) {
        self.state.lock().unwrap().reactivate_on_poll = true;
    }

    pub fn set_status(&self, cluster: &str, id: &str, status: InstanceStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state
            .instances
            .get_mut(cluster)
            .and_then(|v| v.iter_mut().find(|r| r.instance_id == id))
        {
            record.status = status;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Status changes in call order, as (instance handle, status)
    pub fn status_changes(&self) -> Vec<(String, InstanceStatus)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetStatus { handle, status, .. } => Some((handle, status)),
                _ => None,
            })
            .collect()
    }

    pub fn drain_calls(&self) -> usize {
        self.status_changes()
            .iter()
            .filter(|(_, s)| *s == InstanceStatus::Draining)
            .count()
    }

    pub fn snapshot_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::ListInstances { .. }))
            .count()
    }

    pub fn status_of(&self, cluster: &str, id: &str) -> Option<InstanceStatus> {
        let state = self.state.lock().unwrap();
        state
            .instances
            .get(cluster)
            .and_then(|v| v.iter().find(|r| r.instance_id == id))
            .map(|r| r.status.clone())
    }

    fn check_cluster(state: &State, cluster: &str) -> Result<(), InventoryError> {
        if state.failing_clusters.iter().any(|c| c == cluster) {
            return Err(InventoryError::Api(format!("throttled on {}", cluster)));
        }
        Ok(())
    }

    fn not_found(cluster: &str, handle: &DrainHandle) -> InventoryError {
        InventoryError::NotFound {
            cluster: cluster.to_string(),
            instance: handle.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Inventory for FakeInventory {
    async fn list_clusters(&self) -> Result<Vec<String>, InventoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListClusters);
        Ok(state.clusters.clone())
    }

    async fn list_instances(
        &self,
        cluster: &str,
        status: InstanceStatus,
    ) -> Result<Vec<InstanceRecord>, InventoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListInstances {
            cluster: cluster.to_string(),
            status: status.clone(),
        });
        Self::check_cluster(&state, cluster)?;

        Ok(state
            .instances
            .get(cluster)
            .map(|v| v.iter().filter(|r| r.status == status).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_instance(
        &self,
        cluster: &str,
        handle: &DrainHandle,
    ) -> Result<InstanceRecord, InventoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetInstance {
            cluster: cluster.to_string(),
            handle: handle.to_string(),
        });
        Self::check_cluster(&state, cluster)?;

        let step = state.drain_step;
        let failing_polls = state.failing_polls;
        let reactivate = state.reactivate_on_poll;
        let record = state
            .instances
            .get_mut(cluster)
            .and_then(|v| v.iter_mut().find(|r| &r.handle == handle))
            .ok_or_else(|| Self::not_found(cluster, handle))?;

        if record.status == InstanceStatus::Draining {
            if failing_polls {
                return Err(InventoryError::Api("poll failed".to_string()));
            }
            record.running_tasks = record.running_tasks.saturating_sub(step);
            if reactivate {
                record.status = InstanceStatus::Active;
            }
        }

        Ok(record.clone())
    }

    async fn set_instance_status(
        &self,
        cluster: &str,
        handle: &DrainHandle,
        status: InstanceStatus,
    ) -> Result<InstanceRecord, InventoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetStatus {
            cluster: cluster.to_string(),
            handle: handle.to_string(),
            status: status.clone(),
        });
        Self::check_cluster(&state, cluster)?;

        let record = state
            .instances
            .get_mut(cluster)
            .and_then(|v| v.iter_mut().find(|r| &r.handle == handle))
            .ok_or_else(|| Self::not_found(cluster, handle))?;
        record.status = status;

        Ok(record.clone())
    }
}
