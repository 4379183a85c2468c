//! Cluster Iterator
//!
//! Runs the rebalance loop once for every cluster in the region, one
//! cluster at a time. A failing cluster is recorded and skipped.

use std::time::{Duration, Instant};

use tracing::{error, info, instrument};

use crate::config::RebalancerConfig;
use crate::error::{InventoryError, RebalanceError};
use crate::inventory::{Inventory, SENTINEL_CLUSTER};
use crate::rebalance::{RebalanceReport, Rebalancer};

/// A cluster whose rebalance loop failed
#[derive(Debug)]
pub struct ClusterFailure {
    pub cluster: String,
    pub error: RebalanceError,
}

/// Result of one pass over a region
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Clusters whose loop completed
    pub completed: Vec<RebalanceReport>,
    pub failed: Vec<ClusterFailure>,
    /// Sentinel clusters that were not touched
    pub skipped: Vec<String>,
    pub duration: Duration,
}

impl SweepReport {
    pub fn total_drains(&self) -> usize {
        self.completed.iter().map(|r| r.drains.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} clusters rebalanced, {} failed, {} skipped, {} drains in {:?}",
            self.completed.len(),
            self.failed.len(),
            self.skipped.len(),
            self.total_drains(),
            self.duration
        )
    }
}

/// Rebalance every cluster in the region.
///
/// Only a failure to list the clusters is returned as an error.
#[instrument(skip(inventory, config), fields(region = %config.region))]
pub async fn sweep<I>(
    inventory: &I,
    config: &RebalancerConfig,
) -> Result<SweepReport, InventoryError>
where
    I: Inventory + ?Sized,
{
    let start = Instant::now();
    let mut report = SweepReport::default();

    let clusters = inventory.list_clusters().await?;
    info!(clusters = ?clusters, "Clusters found");

    let rebalancer = Rebalancer::new(inventory, config.rebalance_params());

    for cluster in clusters {
        if cluster == SENTINEL_CLUSTER {
            info!(cluster = %cluster, "Skipping sentinel cluster");
            report.skipped.push(cluster);
            continue;
        }

        match rebalancer.run(&cluster).await {
            Ok(cluster_report) => {
                info!(summary = %cluster_report.summary(), "Cluster done");
                report.completed.push(cluster_report);
            }
            Err(e) => {
                error!(cluster = %cluster, error = %e, "Rebalancing failed");
                report.failed.push(ClusterFailure { cluster, error: e });
            }
        }
    }

    report.duration = start.elapsed();
    info!(summary = %report.summary(), "Sweep complete");

    Ok(report)
}
