//! Rebalance Loop
//!
//! Per-cluster control loop. Each pass takes a fresh distribution
//! snapshot, checks whether the spread of tasks is acceptable and, if
//! not, drains the most loaded instance. The loop stops when:
//! - the cluster has no active instances, at most one task, or a single
//!   instance
//! - the coefficient of variation is within the threshold
//! - `max_drained_instances` drains have been performed
//! - `max_retries` is reached and the retry policy is strict

use std::fmt;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::distribution::snapshot;
use crate::drain::{DrainController, DrainReport};
use crate::error::Result;
use crate::inventory::Inventory;
use crate::stats::Stats;

/// What happens once `max_retries` is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Report the bound and keep going; the drain bound ends the loop
    #[default]
    LogOnly,
    /// Stop the cluster's loop at the bound
    Strict,
}

/// Bounds for one cluster's rebalance loop
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceParams {
    /// Sleep between task count polls while draining
    pub poll_interval: Duration,
    /// Drain timeout for the first drain, halved after each one
    pub drain_timeout: Duration,
    pub max_drained_instances: u32,
    pub max_retries: u32,
    /// Acceptable coefficient of variation, in percent
    pub cov_threshold_percent: f64,
    /// Pause after a drain before the next snapshot
    pub settle_interval: Duration,
    pub retry_policy: RetryPolicy,
    /// Log the decision instead of draining
    pub dry_run: bool,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(45),
            max_drained_instances: 2,
            max_retries: 3,
            cov_threshold_percent: 25.0,
            settle_interval: Duration::from_secs(60),
            retry_policy: RetryPolicy::LogOnly,
            dry_run: false,
        }
    }
}

/// Why a cluster's loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum RebalanceOutcome {
    /// No active instances
    NoInstances,
    /// Zero or one task in the whole cluster
    TooFewTasks { total: u64 },
    /// A single active instance is never rebalanced
    SingleInstance,
    /// Coefficient of variation within the threshold
    Balanced { stats: Stats },
    DrainLimitReached { drained: u32 },
    /// Only with [`RetryPolicy::Strict`]
    RetryLimitReached { retries: u32 },
    /// Dry run stopped at the first drain decision
    DryRun { instance_id: String, stats: Stats },
}

/// Per-cluster, per-run loop state
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceSession {
    pub drained_instances: u32,
    pub retries: u32,
    /// Timeout for the next drain
    pub drain_timeout: Duration,
}

impl RebalanceSession {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            drained_instances: 0,
            retries: 0,
            drain_timeout,
        }
    }
}

/// Result of rebalancing one cluster
#[derive(Debug, Clone)]
pub struct RebalanceReport {
    pub cluster: String,
    pub outcome: RebalanceOutcome,
    /// Drain actions in the order they were performed
    pub drains: Vec<DrainReport>,
    /// Distribution snapshots taken
    pub snapshots: usize,
}

impl RebalanceReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} after {} snapshots, {} drains",
            self.cluster,
            self.outcome,
            self.snapshots,
            self.drains.len()
        )
    }
}

impl fmt::Display for RebalanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceOutcome::NoInstances => write!(f, "no active instances"),
            RebalanceOutcome::TooFewTasks { total } => write!(f, "only {} tasks", total),
            RebalanceOutcome::SingleInstance => write!(f, "single instance"),
            RebalanceOutcome::Balanced { stats } => write!(f, "balanced ({})", stats),
            RebalanceOutcome::DrainLimitReached { drained } => {
                write!(f, "drain limit reached ({} drained)", drained)
            }
            RebalanceOutcome::RetryLimitReached { retries } => {
                write!(f, "retry limit reached ({} retries)", retries)
            }
            RebalanceOutcome::DryRun { instance_id, stats } => {
                write!(f, "dry run, would drain {} ({})", instance_id, stats)
            }
        }
    }
}

/// Runs the rebalance loop against an [`Inventory`]
pub struct Rebalancer<'a, I: ?Sized> {
    inventory: &'a I,
    params: RebalanceParams,
}

impl<'a, I> Rebalancer<'a, I>
where
    I: Inventory + ?Sized,
{
    pub fn new(inventory: &'a I, params: RebalanceParams) -> Self {
        Self { inventory, params }
    }

    pub fn params(&self) -> &RebalanceParams {
        &self.params
    }

    /// Rebalance one cluster until a termination rule fires.
    ///
    /// Inventory failures end this cluster's loop and are returned as is.
    #[instrument(skip(self))]
    pub async fn run(&self, cluster: &str) -> Result<RebalanceReport> {
        let mut session = RebalanceSession::new(self.params.drain_timeout);
        let drainer = DrainController::new(self.inventory, self.params.poll_interval);
        let mut report = RebalanceReport {
            cluster: cluster.to_string(),
            outcome: RebalanceOutcome::NoInstances,
            drains: Vec::new(),
            snapshots: 0,
        };

        loop {
            let distribution = snapshot(self.inventory, cluster).await?;
            report.snapshots += 1;

            let Some(target) = distribution.head().cloned() else {
                info!("No task distribution available");
                report.outcome = RebalanceOutcome::NoInstances;
                return Ok(report);
            };

            let total = distribution.total_tasks();
            if total <= 1 {
                info!(total, "Only 0 or 1 task is running, rebalancing not required");
                report.outcome = RebalanceOutcome::TooFewTasks { total };
                return Ok(report);
            }

            if distribution.len() == 1 {
                info!(tasks = total, "Single active instance, rebalancing not possible");
                report.outcome = RebalanceOutcome::SingleInstance;
                return Ok(report);
            }

            let stats = Stats::compute(&distribution.task_counts())?;
            info!(
                tasks = %distribution,
                mean = stats.mean,
                sd = stats.standard_deviation,
                cov = stats.coefficient_of_variation,
                "Task distribution"
            );

            if stats.coefficient_of_variation <= self.params.cov_threshold_percent {
                info!("Coefficient of variation within threshold");
                report.outcome = RebalanceOutcome::Balanced { stats };
                return Ok(report);
            }

            info!(
                cov = stats.coefficient_of_variation,
                threshold = self.params.cov_threshold_percent,
                instance = %target.instance_id,
                tasks = target.task_count,
                "Coefficient of variation too high, rebalancing"
            );

            if self.params.dry_run {
                info!(instance = %target.instance_id, "Dry run mode, skipping drain");
                report.outcome = RebalanceOutcome::DryRun {
                    instance_id: target.instance_id,
                    stats,
                };
                return Ok(report);
            }

            let drained = drainer
                .drain(cluster, &target, stats.mean, session.drain_timeout)
                .await?;
            report.drains.push(drained);

            session.drained_instances += 1;
            if session.drained_instances >= self.params.max_drained_instances {
                info!(
                    drained = session.drained_instances,
                    "Reached max draining instances"
                );
                report.outcome = RebalanceOutcome::DrainLimitReached {
                    drained: session.drained_instances,
                };
                return Ok(report);
            }

            session.retries += 1;
            if session.retries >= self.params.max_retries {
                warn!(retries = session.retries, "Reached max rebalance retries");
                if self.params.retry_policy == RetryPolicy::Strict {
                    report.outcome = RebalanceOutcome::RetryLimitReached {
                        retries: session.retries,
                    };
                    return Ok(report);
                }
            }

            session.drain_timeout /= 2;
            info!(drain_timeout = ?session.drain_timeout, "Reduced drain timeout");

            info!(settle = ?self.params.settle_interval, "Waiting for tasks to settle");
            tokio::time::sleep(self.params.settle_interval).await;
        }
    }
}
