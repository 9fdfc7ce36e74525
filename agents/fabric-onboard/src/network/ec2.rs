//! EC2 networking adapter

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::metadata::InstanceMetadata;
use super::types::{CreateEndpointRequest, EndpointState, HostPlacement, IngressRule, PrivateEndpoint};
use super::{NetworkMutator, NetworkResourceProbe};
use crate::aws::{AwsCli, CloudError};

const SERVICE: &str = "ec2";
const ENDPOINT_NOT_FOUND: &str = "InvalidVpcEndpointId.NotFound";

// ============================================================
// CLI Response Types
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    vpc_id: Option<String>,
    subnet_id: Option<String>,
    #[serde(default)]
    security_groups: Vec<GroupRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupRef {
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeVpcEndpointsOutput {
    #[serde(default)]
    vpc_endpoints: Vec<VpcEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateVpcEndpointOutput {
    vpc_endpoint: VpcEndpoint,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcEndpoint {
    vpc_endpoint_id: String,
    service_name: String,
    vpc_id: String,
    state: String,
    #[serde(default)]
    subnet_ids: Vec<String>,
    #[serde(default)]
    groups: Vec<GroupRef>,
}

impl From<VpcEndpoint> for PrivateEndpoint {
    fn from(ep: VpcEndpoint) -> Self {
        Self {
            id: ep.vpc_endpoint_id,
            service_name: ep.service_name,
            vpc_id: ep.vpc_id,
            subnet_ids: ep.subnet_ids.into_iter().collect(),
            security_group_ids: ep.groups.into_iter().map(|g| g.group_id).collect::<BTreeSet<_>>(),
            state: EndpointState::from_ec2(&ep.state),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroupsOutput {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    #[serde(default)]
    ip_permissions: Vec<IpPermission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpPermission {
    ip_protocol: String,
    from_port: Option<i64>,
    to_port: Option<i64>,
    #[serde(default)]
    user_id_group_pairs: Vec<GroupRef>,
}

impl IpPermission {
    /// One rule per source group; port-less permissions span every port
    fn into_rules(self) -> Vec<IngressRule> {
        let from_port = port_or(self.from_port, 0);
        let to_port = port_or(self.to_port, u16::MAX);
        let protocol = self.ip_protocol;

        self.user_id_group_pairs
            .into_iter()
            .map(|pair| IngressRule {
                protocol: protocol.clone(),
                from_port,
                to_port,
                source_group_id: pair.group_id,
            })
            .collect()
    }
}

fn port_or(port: Option<i64>, fallback: u16) -> u16 {
    match port {
        Some(p) if (0..=i64::from(u16::MAX)).contains(&p) => p as u16,
        _ => fallback,
    }
}

// ============================================================
// Adapter Implementation
// ============================================================

/// EC2-backed probe and mutator
pub struct Ec2Network {
    cli: AwsCli,
    metadata: InstanceMetadata,
}

impl Ec2Network {
    pub fn new(cli: AwsCli, metadata: InstanceMetadata) -> Self {
        Self { cli, metadata }
    }
}

#[async_trait]
impl NetworkResourceProbe for Ec2Network {
    async fn host_placement(&self) -> Result<HostPlacement, CloudError> {
        let instance_id = self.metadata.instance_id().await?;

        let output: DescribeInstancesOutput = self
            .cli
            .call_json(SERVICE, "describe-instances", &["--instance-ids", instance_id.as_str()])
            .await?;

        let instance = output
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| {
                CloudError::local(
                    "ec2 describe-instances",
                    format!("instance {instance_id} not returned by EC2"),
                )
            })?;

        let missing = |field: &str| {
            CloudError::local(
                "ec2 describe-instances",
                format!("instance {instance_id} has no {field}"),
            )
        };

        let placement = HostPlacement {
            vpc_id: instance.vpc_id.ok_or_else(|| missing("VPC"))?,
            subnet_id: instance.subnet_id.ok_or_else(|| missing("subnet"))?,
            security_group_ids: instance
                .security_groups
                .into_iter()
                .map(|g| g.group_id)
                .collect(),
            instance_id: instance.instance_id,
        };

        debug!(
            instance_id = %placement.instance_id,
            vpc_id = %placement.vpc_id,
            subnet_id = %placement.subnet_id,
            "Resolved host placement"
        );
        Ok(placement)
    }

    async fn find_endpoints(
        &self,
        service_name: &str,
        vpc_id: &str,
    ) -> Result<Vec<PrivateEndpoint>, CloudError> {
        let service_filter = format!("Name=service-name,Values={service_name}");
        let vpc_filter = format!("Name=vpc-id,Values={vpc_id}");

        let output: DescribeVpcEndpointsOutput = self
            .cli
            .call_json(
                SERVICE,
                "describe-vpc-endpoints",
                &["--filters", service_filter.as_str(), vpc_filter.as_str()],
            )
            .await?;

        Ok(output
            .vpc_endpoints
            .into_iter()
            .map(PrivateEndpoint::from)
            .collect())
    }

    async fn endpoint(&self, endpoint_id: &str) -> Result<Option<PrivateEndpoint>, CloudError> {
        let result: Result<DescribeVpcEndpointsOutput, CloudError> = self
            .cli
            .call_json(
                SERVICE,
                "describe-vpc-endpoints",
                &["--vpc-endpoint-ids", endpoint_id],
            )
            .await;

        match result {
            Ok(output) => Ok(output
                .vpc_endpoints
                .into_iter()
                .find(|ep| ep.vpc_endpoint_id == endpoint_id)
                .map(PrivateEndpoint::from)),
            Err(e) if e.has_code(ENDPOINT_NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn ingress_rules(&self, group_id: &str) -> Result<Vec<IngressRule>, CloudError> {
        let output: DescribeSecurityGroupsOutput = self
            .cli
            .call_json(SERVICE, "describe-security-groups", &["--group-ids", group_id])
            .await?;

        Ok(output
            .security_groups
            .into_iter()
            .flat_map(|g| g.ip_permissions)
            .flat_map(IpPermission::into_rules)
            .collect())
    }
}

#[async_trait]
impl NetworkMutator for Ec2Network {
    async fn create_endpoint(
        &self,
        request: &CreateEndpointRequest,
    ) -> Result<PrivateEndpoint, CloudError> {
        let mut args: Vec<&str> = vec![
            "--vpc-endpoint-type",
            "Interface",
            "--vpc-id",
            request.vpc_id.as_str(),
            "--service-name",
            request.service_name.as_str(),
            "--client-token",
            request.client_token.as_str(),
        ];
        args.push("--subnet-ids");
        args.extend(request.subnet_ids.iter().map(String::as_str));
        if !request.security_group_ids.is_empty() {
            args.push("--security-group-ids");
            args.extend(request.security_group_ids.iter().map(String::as_str));
        }
        args.push(if request.private_dns_enabled {
            "--private-dns-enabled"
        } else {
            "--no-private-dns-enabled"
        });

        let output: CreateVpcEndpointOutput = self
            .cli
            .call_json(SERVICE, "create-vpc-endpoint", &args)
            .await?;

        let endpoint = PrivateEndpoint::from(output.vpc_endpoint);
        info!(
            endpoint_id = %endpoint.id,
            service_name = %endpoint.service_name,
            "Created VPC endpoint"
        );
        Ok(endpoint)
    }

    async fn add_attachments(
        &self,
        endpoint_id: &str,
        subnet_ids: &[String],
        security_group_ids: &[String],
    ) -> Result<(), CloudError> {
        let mut args: Vec<&str> = vec!["--vpc-endpoint-id", endpoint_id];
        if !subnet_ids.is_empty() {
            args.push("--add-subnet-ids");
            args.extend(subnet_ids.iter().map(String::as_str));
        }
        if !security_group_ids.is_empty() {
            args.push("--add-security-group-ids");
            args.extend(security_group_ids.iter().map(String::as_str));
        }

        self.cli.call(SERVICE, "modify-vpc-endpoint", &args).await?;
        Ok(())
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rule: &IngressRule,
    ) -> Result<(), CloudError> {
        let permissions = json!([{
            "IpProtocol": rule.protocol,
            "FromPort": rule.from_port,
            "ToPort": rule.to_port,
            "UserIdGroupPairs": [{ "GroupId": rule.source_group_id }],
        }])
        .to_string();

        self.cli
            .call(
                SERVICE,
                "authorize-security-group-ingress",
                &["--group-id", group_id, "--ip-permissions", permissions.as_str()],
            )
            .await?;
        Ok(())
    }
}
