//! Inventory abstraction
//!
//! The rebalancer only talks to the cluster manager through the
//! [`Inventory`] trait, so the decision logic can be driven by an
//! in-memory fake in tests and by the ECS API in production.

use std::fmt;

use crate::error::InventoryError;

/// Cluster name the inventory API reports as a duplicate of the real
/// clusters. Instances show up in both, so it is never rebalanced.
pub const SENTINEL_CLUSTER: &str = "default";

/// Lifecycle status of a container instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    /// Accepting new tasks
    Active,
    /// Not accepting new tasks, existing tasks are being moved away
    Draining,
    /// Any other status reported by the API (registering, inactive, ...)
    Other(String),
}

impl InstanceStatus {
    /// Wire representation used by the cluster manager API
    pub fn as_str(&self) -> &str {
        match self {
            InstanceStatus::Active => "ACTIVE",
            InstanceStatus::Draining => "DRAINING",
            InstanceStatus::Other(s) => s.as_str(),
        }
    }

    /// Parse the API representation; unknown values are kept verbatim
    pub fn from_api(value: &str) -> Self {
        match value {
            "ACTIVE" => InstanceStatus::Active,
            "DRAINING" => InstanceStatus::Draining,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque token used to change an instance's lifecycle status
/// (the container instance ARN for ECS)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DrainHandle(String);

impl DrainHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DrainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One container instance as reported by the inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Compute instance identity (EC2 instance id)
    pub instance_id: String,
    pub handle: DrainHandle,
    pub status: InstanceStatus,
    pub running_tasks: u32,
    pub pending_tasks: u32,
}

impl InstanceRecord {
    /// Tasks placed on the instance, running or pending
    pub fn task_count(&self) -> u64 {
        u64::from(self.running_tasks) + u64::from(self.pending_tasks)
    }
}

/// Remote cluster manager, bound to a single region
#[async_trait::async_trait]
pub trait Inventory: Send + Sync {
    /// Names of all clusters in the region, as returned by the API
    async fn list_clusters(&self) -> Result<Vec<String>, InventoryError>;

    /// Instances of `cluster` whose lifecycle status is `status`
    async fn list_instances(
        &self,
        cluster: &str,
        status: InstanceStatus,
    ) -> Result<Vec<InstanceRecord>, InventoryError>;

    /// Current state of a single instance
    async fn get_instance(
        &self,
        cluster: &str,
        handle: &DrainHandle,
    ) -> Result<InstanceRecord, InventoryError>;

    /// Change an instance's lifecycle status, returning the updated record
    async fn set_instance_status(
        &self,
        cluster: &str,
        handle: &DrainHandle,
        status: InstanceStatus,
    ) -> Result<InstanceRecord, InventoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_api_strings() {
        assert_eq!(InstanceStatus::from_api("ACTIVE"), InstanceStatus::Active);
        assert_eq!(InstanceStatus::from_api("DRAINING"), InstanceStatus::Draining);
        assert_eq!(
            InstanceStatus::from_api("REGISTERING"),
            InstanceStatus::Other("REGISTERING".to_string())
        );
        assert_eq!(InstanceStatus::Other("INACTIVE".to_string()).as_str(), "INACTIVE");
    }

    #[test]
    fn test_task_count_includes_pending() {
        let record = InstanceRecord {
            instance_id: "i-1".to_string(),
            handle: DrainHandle::new("arn:1"),
            status: InstanceStatus::Active,
            running_tasks: 4,
            pending_tasks: 2,
        };
        assert_eq!(record.task_count(), 6);
    }
}
