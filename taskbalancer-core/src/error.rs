//! Error types for the task balancer
//!
//! Adapter failures, statistics precondition violations and the
//! per-cluster rebalance error that wraps both.

use thiserror::Error;

/// Result type alias for rebalance operations
pub type Result<T> = std::result::Result<T, RebalanceError>;

/// Errors raised by an [`Inventory`](crate::Inventory) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Remote call failed (network, throttling, permissions)
    #[error("Inventory API error: {0}")]
    Api(String),

    #[error("Instance not found: {instance} in cluster {cluster}")]
    NotFound { cluster: String, instance: String },

    /// Remote call succeeded but returned something unusable
    #[error("Unexpected inventory response: {0}")]
    UnexpectedResponse(String),
}

/// Statistics precondition violations
///
/// The rebalance loop guards against both before computing stats, so
/// seeing one of these means a caller skipped its guards.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    #[error("At least 2 samples required, got {0}")]
    TooFewSamples(usize),

    #[error("Mean task count is zero")]
    ZeroMean,
}

/// Failure of one cluster's rebalance loop
#[derive(Error, Debug)]
pub enum RebalanceError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),
}
