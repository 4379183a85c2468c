//! Task Balancer Core
//!
//! Decision engine for rebalancing tasks across the container instances
//! of a cluster:
//! - Task distribution snapshots (most loaded instance first)
//! - Coefficient of variation test against a threshold
//! - Bounded drain/poll/restore of the most loaded instance
//! - Region-wide sweep over all clusters
//!
//! All remote state goes through the [`Inventory`] trait.

pub mod config;
pub mod distribution;
pub mod drain;
pub mod error;
pub mod inventory;
pub mod rebalance;
pub mod stats;
pub mod sweep;

// Re-export main types
pub use config::{ConfigError, RebalancerConfig};
pub use distribution::{snapshot, Distribution, InstanceSample};
pub use drain::{DrainController, DrainExit, DrainReport, CORRECTION_MARGIN};
pub use error::{InventoryError, RebalanceError, Result, StatsError};
pub use inventory::{DrainHandle, InstanceRecord, InstanceStatus, Inventory, SENTINEL_CLUSTER};
pub use rebalance::{
    RebalanceOutcome, RebalanceParams, RebalanceReport, RebalanceSession, Rebalancer, RetryPolicy,
};
pub use stats::Stats;
pub use sweep::{sweep, ClusterFailure, SweepReport};
