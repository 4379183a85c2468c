//! Rebalancer configuration
//!
//! Tunables arrive from the trigger layer (CLI flags or environment),
//! are validated and clamped once here, and are then handed to the
//! rebalance loop by value.

use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::rebalance::{RebalanceParams, RetryPolicy};

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

// Operational bounds. Polling faster than the floor risks API throttling,
// the ceilings keep one scheduled run short.
const MIN_POLL_INTERVAL_SECS: u64 = 10;
const MAX_POLL_INTERVAL_SECS: u64 = 30;
const MAX_DRAIN_TIMEOUT_SECS: u64 = 60;
const MAX_DRAINED_INSTANCES: u32 = 3;
const MAX_RETRIES: u32 = 5;
const MAX_COV_PERCENT: f64 = 30.0;

/// Task balancer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RebalancerConfig {
    /// Region whose clusters are rebalanced
    pub region: String,

    /// Seconds between task count polls while draining
    pub poll_interval_secs: u64,

    /// Seconds before a drain is abandoned
    pub drain_timeout_secs: u64,

    /// Maximum instances drained per cluster per run
    pub max_drained_instances: u32,

    /// Rebalance attempts per cluster before the bound is reported
    pub max_retries: u32,

    /// Acceptable coefficient of variation, in percent
    pub cov_threshold_percent: f64,

    /// Seconds to let the scheduler redistribute tasks after a drain
    pub settle_interval_secs: u64,

    /// Stop a cluster's loop once `max_retries` is reached
    pub strict_retries: bool,

    /// Log decisions without draining anything
    pub dry_run: bool,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            poll_interval_secs: 30,
            drain_timeout_secs: 45,
            max_drained_instances: 2,
            max_retries: 3,
            cov_threshold_percent: 25.0,
            settle_interval_secs: 60,
            strict_retries: false,
            dry_run: false,
        }
    }
}

impl RebalancerConfig {
    /// Reject settings the rebalancer cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::MissingEnvVar("AWS_REGION".to_string()));
        }

        let positive = [
            ("DRAIN_SLEEP_TIME", self.poll_interval_secs > 0, self.poll_interval_secs.to_string()),
            ("DRAIN_TIMEOUT", self.drain_timeout_secs > 0, self.drain_timeout_secs.to_string()),
            (
                "DRAIN_MAX_INSTANCES",
                self.max_drained_instances > 0,
                self.max_drained_instances.to_string(),
            ),
            ("REBALANCE_MAX_RETRY", self.max_retries > 0, self.max_retries.to_string()),
            (
                "COV_PERCENT",
                self.cov_threshold_percent.is_finite() && self.cov_threshold_percent > 0.0,
                self.cov_threshold_percent.to_string(),
            ),
        ];

        for (name, ok, value) in positive {
            if !ok {
                return Err(ConfigError::InvalidValue(name.to_string(), value));
            }
        }

        Ok(())
    }

    /// Pull every tunable into its operational range
    pub fn clamped(self) -> Self {
        let clamped = Self {
            poll_interval_secs: self
                .poll_interval_secs
                .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS),
            drain_timeout_secs: self.drain_timeout_secs.min(MAX_DRAIN_TIMEOUT_SECS),
            max_drained_instances: self.max_drained_instances.min(MAX_DRAINED_INSTANCES),
            max_retries: self.max_retries.min(MAX_RETRIES),
            cov_threshold_percent: self.cov_threshold_percent.min(MAX_COV_PERCENT),
            ..self.clone()
        };

        if clamped != self {
            info!(
                poll_interval_secs = clamped.poll_interval_secs,
                drain_timeout_secs = clamped.drain_timeout_secs,
                max_drained_instances = clamped.max_drained_instances,
                max_retries = clamped.max_retries,
                cov_threshold_percent = clamped.cov_threshold_percent,
                "Adjusted settings to operational bounds"
            );
        }

        clamped
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_secs(self.settle_interval_secs)
    }

    /// Bounds for one cluster's rebalance loop
    pub fn rebalance_params(&self) -> RebalanceParams {
        RebalanceParams {
            poll_interval: self.poll_interval(),
            drain_timeout: self.drain_timeout(),
            max_drained_instances: self.max_drained_instances,
            max_retries: self.max_retries,
            cov_threshold_percent: self.cov_threshold_percent,
            settle_interval: self.settle_interval(),
            retry_policy: if self.strict_retries {
                RetryPolicy::Strict
            } else {
                RetryPolicy::LogOnly
            },
            dry_run: self.dry_run,
        }
    }
}
