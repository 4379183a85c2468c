//! ECS Task Balancer
//!
//! Binds the rebalancing core to AWS ECS. The `taskbalancer` binary runs
//! one sweep over every cluster of a region per invocation.

pub mod ecs_client;

pub use ecs_client::{cluster_name, EcsInventory};
