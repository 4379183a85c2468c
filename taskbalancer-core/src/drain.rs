//! Drain Controller
//!
//! Moves one instance to DRAINING, polls it until its task count falls to
//! the cluster mean or the drain timeout elapses, then puts it back to
//! ACTIVE. Restoring is unconditional once the drain call succeeded, so a
//! run never leaves an instance drained behind it.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::distribution::InstanceSample;
use crate::error::InventoryError;
use crate::inventory::{DrainHandle, InstanceStatus, Inventory};

/// Added to the remaining drain time when capping the poll sleep, so the
/// last poll lands past the deadline instead of exactly on it.
pub const CORRECTION_MARGIN: Duration = Duration::from_secs(3);

/// Why a drain stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainExit {
    /// Task count fell to the target mean
    TargetReached,
    /// Drain timeout elapsed first
    TimedOut,
    /// Something else moved the instance out of DRAINING while we polled
    Reactivated,
    /// Instance was already draining before we touched it; left as is
    AlreadyDraining,
}

/// Result of a single drain action
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    pub instance_id: String,
    pub handle: DrainHandle,
    pub initial_tasks: u64,
    /// Last task count observed before restoring
    pub final_tasks: u64,
    pub target_mean: f64,
    pub exit: DrainExit,
    pub elapsed: Duration,
}

impl DrainReport {
    /// Whether this action toggled the instance's lifecycle status
    pub fn changed_state(&self) -> bool {
        self.exit != DrainExit::AlreadyDraining
    }
}

/// Drains instances through an [`Inventory`]
pub struct DrainController<'a, I: ?Sized> {
    inventory: &'a I,
    poll_interval: Duration,
    correction_margin: Duration,
}

impl<'a, I> DrainController<'a, I>
where
    I: Inventory + ?Sized,
{
    pub fn new(inventory: &'a I, poll_interval: Duration) -> Self {
        Self {
            inventory,
            poll_interval,
            correction_margin: CORRECTION_MARGIN,
        }
    }

    pub fn with_correction_margin(mut self, margin: Duration) -> Self {
        self.correction_margin = margin;
        self
    }

    /// Drain `sample` until it holds at most `target_mean` tasks or
    /// `timeout` elapses, then restore it to ACTIVE.
    ///
    /// A failed poll read still restores the instance before the error
    /// is returned.
    #[instrument(
        skip(self, sample),
        fields(instance = %sample.instance_id, tasks = sample.task_count)
    )]
    pub async fn drain(
        &self,
        cluster: &str,
        sample: &InstanceSample,
        target_mean: f64,
        timeout: Duration,
    ) -> Result<DrainReport, InventoryError> {
        let current = self.inventory.get_instance(cluster, &sample.handle).await?;
        if current.status == InstanceStatus::Draining {
            warn!(
                handle = %sample.handle,
                "Instance already draining, leaving it untouched"
            );
            return Ok(self.report(
                sample,
                target_mean,
                current.task_count(),
                DrainExit::AlreadyDraining,
                Duration::ZERO,
            ));
        }

        self.inventory
            .set_instance_status(cluster, &sample.handle, InstanceStatus::Draining)
            .await?;
        info!(
            handle = %sample.handle,
            target_mean,
            timeout = ?timeout,
            "Draining instance"
        );

        let started = Instant::now();
        let polled = self
            .wait_for_target(cluster, sample, target_mean, timeout, started)
            .await;

        info!(handle = %sample.handle, "Stopping drain");
        let restored = self
            .inventory
            .set_instance_status(cluster, &sample.handle, InstanceStatus::Active)
            .await;

        let (final_tasks, exit) = match polled {
            Ok(result) => result,
            Err(e) => {
                if let Err(restore_err) = &restored {
                    error!(
                        handle = %sample.handle,
                        error = %restore_err,
                        "Failed to restore instance after poll failure"
                    );
                }
                return Err(e);
            }
        };

        let restored = restored?;
        info!(
            handle = %sample.handle,
            remaining = restored.running_tasks,
            exit = ?exit,
            "Drain stopped"
        );

        Ok(self.report(sample, target_mean, final_tasks, exit, started.elapsed()))
    }

    async fn wait_for_target(
        &self,
        cluster: &str,
        sample: &InstanceSample,
        target_mean: f64,
        timeout: Duration,
        started: Instant,
    ) -> Result<(u64, DrainExit), InventoryError> {
        let mut task_count = sample.task_count;

        loop {
            if task_count as f64 <= target_mean {
                return Ok((task_count, DrainExit::TargetReached));
            }

            let elapsed = started.elapsed();
            if elapsed > timeout {
                info!(timeout = ?timeout, "Reached drain timeout, stopping drainage");
                return Ok((task_count, DrainExit::TimedOut));
            }

            let sleep_for = self
                .poll_interval
                .min(timeout.saturating_sub(elapsed) + self.correction_margin);
            debug!(sleep = ?sleep_for, tasks = task_count, "Waiting for tasks to move");
            tokio::time::sleep(sleep_for).await;

            let instance = self.inventory.get_instance(cluster, &sample.handle).await?;
            task_count = instance.task_count();

            if instance.status != InstanceStatus::Draining {
                warn!(status = %instance.status, "Instance left DRAINING while polling");
                return Ok((task_count, DrainExit::Reactivated));
            }
        }
    }

    fn report(
        &self,
        sample: &InstanceSample,
        target_mean: f64,
        final_tasks: u64,
        exit: DrainExit,
        elapsed: Duration,
    ) -> DrainReport {
        DrainReport {
            instance_id: sample.instance_id.clone(),
            handle: sample.handle.clone(),
            initial_tasks: sample.task_count,
            final_tasks,
            target_mean,
            exit,
            elapsed,
        }
    }
}
