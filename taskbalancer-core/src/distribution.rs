//! Task distribution snapshots
//!
//! A [`Distribution`] is the ranked list of active instances of one
//! cluster, most loaded first. It is rebuilt from live state before every
//! rebalancing decision and never reused.

use std::fmt;

use tracing::{debug, instrument};

use crate::error::InventoryError;
use crate::inventory::{DrainHandle, InstanceRecord, InstanceStatus, Inventory};

/// Task count observed on one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSample {
    pub instance_id: String,
    pub handle: DrainHandle,
    /// Running plus pending tasks
    pub task_count: u64,
}

impl From<InstanceRecord> for InstanceSample {
    fn from(record: InstanceRecord) -> Self {
        let task_count = record.task_count();
        Self {
            instance_id: record.instance_id,
            handle: record.handle,
            task_count,
        }
    }
}

/// Instances sorted by task count, descending
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Distribution {
    samples: Vec<InstanceSample>,
}

impl Distribution {
    /// Rank samples by task count. Ties keep their input order.
    pub fn from_samples(mut samples: Vec<InstanceSample>) -> Self {
        samples.sort_by(|a, b| b.task_count.cmp(&a.task_count));
        Self { samples }
    }

    pub fn samples(&self) -> &[InstanceSample] {
        &self.samples
    }

    /// Most loaded instance
    pub fn head(&self) -> Option<&InstanceSample> {
        self.samples.first()
    }

    pub fn task_counts(&self) -> Vec<u64> {
        self.samples.iter().map(|s| s.task_count).collect()
    }

    pub fn total_tasks(&self) -> u64 {
        self.samples.iter().map(|s| s.task_count).sum()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.task_counts())
    }
}

/// Observe the task distribution over the active instances of `cluster`
#[instrument(skip(inventory))]
pub async fn snapshot<I>(inventory: &I, cluster: &str) -> Result<Distribution, InventoryError>
where
    I: Inventory + ?Sized,
{
    let instances = inventory
        .list_instances(cluster, InstanceStatus::Active)
        .await?;

    let distribution =
        Distribution::from_samples(instances.into_iter().map(InstanceSample::from).collect());

    debug!(
        instances = distribution.len(),
        tasks = %distribution,
        "Observed task distribution"
    );

    Ok(distribution)
}
