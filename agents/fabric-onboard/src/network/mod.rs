//! Private Network Connectivity
//!
//! Observes EC2 networking state and converges the interface VPC endpoint
//! that lets this host reach the network without the public internet.

mod ec2;
mod metadata;
mod reconciler;
mod types;

pub use ec2::Ec2Network;
pub use metadata::InstanceMetadata;
pub use reconciler::{AmbiguityPolicy, EndpointReconciler, PollPolicy, DUPLICATE_RULE_CODE};
pub use types::*;

use async_trait::async_trait;

use crate::aws::CloudError;

/// Read-only view of the networking resources reconciliation depends on
#[async_trait]
pub trait NetworkResourceProbe: Send + Sync {
    /// VPC, subnet and security groups of the instance this process runs on
    async fn host_placement(&self) -> Result<HostPlacement, CloudError>;

    /// Interface endpoints to `service_name` inside `vpc_id`
    async fn find_endpoints(
        &self,
        service_name: &str,
        vpc_id: &str,
    ) -> Result<Vec<PrivateEndpoint>, CloudError>;

    /// Current view of one endpoint; `None` once it no longer exists
    async fn endpoint(&self, endpoint_id: &str) -> Result<Option<PrivateEndpoint>, CloudError>;

    async fn ingress_rules(&self, group_id: &str) -> Result<Vec<IngressRule>, CloudError>;
}

/// Additive mutations on networking resources
#[async_trait]
pub trait NetworkMutator: Send + Sync {
    async fn create_endpoint(
        &self,
        request: &CreateEndpointRequest,
    ) -> Result<PrivateEndpoint, CloudError>;

    async fn add_attachments(
        &self,
        endpoint_id: &str,
        subnet_ids: &[String],
        security_group_ids: &[String],
    ) -> Result<(), CloudError>;

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule)
        -> Result<(), CloudError>;
}
