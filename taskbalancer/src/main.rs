//! ECS Task Balancer
//!
//! Runs once per scheduled trigger:
//! - Reads and clamps settings
//! - Lists the clusters of the region
//! - Drains the busiest instance of each skewed cluster until its task
//!   distribution is acceptable or the run's bounds are reached

use clap::Parser;
use taskbalancer::EcsInventory;
use taskbalancer_core::{sweep, RebalancerConfig};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskbalancer")]
#[command(about = "Rebalance ECS tasks across container instances")]
#[command(version)]
struct Cli {
    /// Region whose clusters are rebalanced
    #[arg(long, env = "AWS_REGION")]
    region: String,

    /// Seconds between task count polls while draining
    #[arg(long, env = "DRAIN_SLEEP_TIME", default_value = "30")]
    poll_interval: u64,

    /// Seconds before a drain is abandoned
    #[arg(long, env = "DRAIN_TIMEOUT", default_value = "45")]
    drain_timeout: u64,

    /// Maximum instances drained per cluster
    #[arg(long, env = "DRAIN_MAX_INSTANCES", default_value = "2")]
    max_instances: u32,

    /// Rebalance attempts per cluster before the bound is reported
    #[arg(long, env = "REBALANCE_MAX_RETRY", default_value = "3")]
    max_retries: u32,

    /// Acceptable coefficient of variation (percent)
    #[arg(long, env = "COV_PERCENT", default_value = "25")]
    cov_percent: f64,

    /// Seconds to wait after a drain before re-evaluating
    #[arg(long, env = "REBALANCE_SETTLE_TIME", default_value = "60")]
    settle_time: u64,

    /// Stop a cluster's loop once max retries is reached
    #[arg(long, env = "REBALANCE_STRICT_RETRIES")]
    strict_retries: bool,

    /// Log decisions without draining
    #[arg(long, env = "REBALANCE_DRY_RUN")]
    dry_run: bool,

    /// Trigger event payload (JSON), logged for traceability
    #[arg(long)]
    event: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn config(&self) -> RebalancerConfig {
        RebalancerConfig {
            region: self.region.clone(),
            poll_interval_secs: self.poll_interval,
            drain_timeout_secs: self.drain_timeout,
            max_drained_instances: self.max_instances,
            max_retries: self.max_retries,
            cov_threshold_percent: self.cov_percent,
            settle_interval_secs: self.settle_time,
            strict_retries: self.strict_retries,
            dry_run: self.dry_run,
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Parse the trigger payload; anything that is not JSON is kept as a string
fn event_payload(raw: Option<&str>) -> serde_json::Value {
    match raw {
        None => serde_json::Value::Object(Default::default()),
        Some(raw) => serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    info!("Starting task balancer");
    info!(event = %event_payload(cli.event.as_deref()), "Trigger event");

    let config = cli.config();
    config.validate()?;
    info!(
        region = %config.region,
        poll_interval_secs = config.poll_interval_secs,
        drain_timeout_secs = config.drain_timeout_secs,
        max_drained_instances = config.max_drained_instances,
        max_retries = config.max_retries,
        cov_threshold_percent = config.cov_threshold_percent,
        dry_run = config.dry_run,
        "Settings"
    );
    let config = config.clamped();

    let inventory = EcsInventory::connect(&config.region).await;
    let report = sweep(&inventory, &config).await?;

    if report.has_failures() {
        for failure in &report.failed {
            warn!(cluster = %failure.cluster, error = %failure.error, "Cluster not rebalanced");
        }
    }

    info!(summary = %report.summary(), "Task balancer finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let cli = Cli::parse_from(["taskbalancer", "--region", "eu-west-1"]);
        let config = cli.config();
        assert_eq!(
            config,
            RebalancerConfig {
                region: "eu-west-1".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "taskbalancer",
            "--region",
            "us-east-1",
            "--poll-interval",
            "5",
            "--cov-percent",
            "40",
            "--strict-retries",
            "--dry-run",
        ]);
        let config = cli.config();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.cov_threshold_percent, 40.0);
        assert!(config.strict_retries);
        assert!(config.dry_run);
    }

    #[test]
    fn test_event_payload() {
        assert_eq!(event_payload(None).to_string(), "{}");
        assert_eq!(
            event_payload(Some(r#"{"source":"aws.events"}"#))["source"],
            "aws.events"
        );
        assert_eq!(
            event_payload(Some("not json")),
            serde_json::Value::String("not json".to_string())
        );
    }
}
