//! ECS inventory client
//!
//! Implements the [`Inventory`] trait over the AWS ECS API. One client is
//! bound to one region.

use aws_sdk_ecs::config::Region;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::{ContainerInstance, ContainerInstanceStatus, Failure};
use aws_sdk_ecs::Client;
use taskbalancer_core::{DrainHandle, InstanceRecord, InstanceStatus, Inventory, InventoryError};
use tracing::{debug, instrument, warn};

/// Page size for `ListContainerInstances`; also the `DescribeContainerInstances` limit
const PAGE_SIZE: i32 = 100;

/// Inventory backed by the ECS control plane
pub struct EcsInventory {
    client: Client,
    region: String,
}

impl EcsInventory {
    /// Load credentials from the default provider chain and connect to `region`
    pub async fn connect(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self::new(Client::new(&config), region)
    }

    pub fn new(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Describe a batch of container instances by ARN
    async fn describe(
        &self,
        cluster: &str,
        arns: Vec<String>,
    ) -> Result<Vec<InstanceRecord>, InventoryError> {
        if arns.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .describe_container_instances()
            .cluster(cluster)
            .set_container_instances(Some(arns))
            .send()
            .await
            .map_err(api_error)?;

        log_failures(cluster, resp.failures());

        resp.container_instances()
            .iter()
            .map(to_record)
            .collect()
    }
}

#[async_trait::async_trait]
impl Inventory for EcsInventory {
    #[instrument(skip(self), fields(region = %self.region))]
    async fn list_clusters(&self) -> Result<Vec<String>, InventoryError> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_clusters()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(api_error)?;

            names.extend(resp.cluster_arns().iter().map(|arn| cluster_name(arn).to_string()));

            match resp.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(count = names.len(), "Listed clusters");
        Ok(names)
    }

    #[instrument(skip(self), fields(region = %self.region))]
    async fn list_instances(
        &self,
        cluster: &str,
        status: InstanceStatus,
    ) -> Result<Vec<InstanceRecord>, InventoryError> {
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_container_instances()
                .cluster(cluster)
                .status(ContainerInstanceStatus::from(status.as_str()))
                .max_results(PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(api_error)?;

            let arns = resp.container_instance_arns().to_vec();
            records.extend(self.describe(cluster, arns).await?);

            match resp.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(count = records.len(), "Listed container instances");
        Ok(records)
    }

    #[instrument(skip(self), fields(region = %self.region))]
    async fn get_instance(
        &self,
        cluster: &str,
        handle: &DrainHandle,
    ) -> Result<InstanceRecord, InventoryError> {
        self.describe(cluster, vec![handle.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| InventoryError::NotFound {
                cluster: cluster.to_string(),
                instance: handle.to_string(),
            })
    }

    #[instrument(skip(self), fields(region = %self.region))]
    async fn set_instance_status(
        &self,
        cluster: &str,
        handle: &DrainHandle,
        status: InstanceStatus,
    ) -> Result<InstanceRecord, InventoryError> {
        let resp = self
            .client
            .update_container_instances_state()
            .cluster(cluster)
            .container_instances(handle.as_str())
            .status(ContainerInstanceStatus::from(status.as_str()))
            .send()
            .await
            .map_err(api_error)?;

        if let Some(failure) = resp.failures().first() {
            return Err(match failure.reason() {
                Some("MISSING") => InventoryError::NotFound {
                    cluster: cluster.to_string(),
                    instance: handle.to_string(),
                },
                reason => InventoryError::UnexpectedResponse(format!(
                    "status update to {} failed: {}",
                    status,
                    reason.unwrap_or("unknown reason")
                )),
            });
        }

        match resp.container_instances().first() {
            Some(instance) => to_record(instance),
            None => Err(InventoryError::UnexpectedResponse(
                "status update returned no container instance".to_string(),
            )),
        }
    }
}

/// Cluster name from a cluster ARN (`arn:aws:ecs:<region>:<account>:cluster/<name>`)
pub fn cluster_name(arn: &str) -> &str {
    arn.split_once('/').map(|(_, name)| name).unwrap_or(arn)
}

fn to_record(instance: &ContainerInstance) -> Result<InstanceRecord, InventoryError> {
    let handle = instance.container_instance_arn().ok_or_else(|| {
        InventoryError::UnexpectedResponse("container instance without ARN".to_string())
    })?;

    Ok(InstanceRecord {
        instance_id: instance.ec2_instance_id().unwrap_or(handle).to_string(),
        handle: DrainHandle::new(handle),
        status: InstanceStatus::from_api(instance.status().unwrap_or_default()),
        running_tasks: non_negative(instance.running_tasks_count()),
        pending_tasks: non_negative(instance.pending_tasks_count()),
    })
}

fn non_negative(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

fn log_failures(cluster: &str, failures: &[Failure]) {
    for failure in failures {
        warn!(
            cluster = cluster,
            arn = failure.arn().unwrap_or_default(),
            reason = failure.reason().unwrap_or_default(),
            "ECS reported a failure for container instance"
        );
    }
}

fn api_error<E>(err: E) -> InventoryError
where
    E: std::error::Error,
{
    InventoryError::Api(DisplayErrorContext(err).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_name_from_arn() {
        assert_eq!(
            cluster_name("arn:aws:ecs:eu-west-1:000000000000:cluster/web"),
            "web"
        );
        assert_eq!(cluster_name("web"), "web");
    }

    #[test]
    fn test_to_record() {
        let instance = ContainerInstance::builder()
            .container_instance_arn("arn:aws:ecs:eu-west-1:000:container-instance/xxx")
            .ec2_instance_id("i-aaaaa")
            .status("ACTIVE")
            .running_tasks_count(12)
            .pending_tasks_count(3)
            .build();

        let record = to_record(&instance).unwrap();
        assert_eq!(record.instance_id, "i-aaaaa");
        assert_eq!(record.status, InstanceStatus::Active);
        assert_eq!(record.task_count(), 15);
        assert_eq!(
            record.handle.as_str(),
            "arn:aws:ecs:eu-west-1:000:container-instance/xxx"
        );
    }

    #[test]
    fn test_to_record_requires_arn() {
        let instance = ContainerInstance::builder().ec2_instance_id("i-aaaaa").build();
        assert!(matches!(
            to_record(&instance),
            Err(InventoryError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_negative_counts_clamp_to_zero() {
        assert_eq!(non_negative(-1), 0);
        assert_eq!(non_negative(7), 7);
    }
}
