//! Amazon Managed Blockchain directory

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::MemberDirectory;
use crate::aws::{AwsCli, CloudError};
use crate::model::{Member, Network, Node, Ownership};

const SERVICE: &str = "managedblockchain";
const AVAILABLE: &str = "AVAILABLE";

// ============================================================
// CLI Response Types
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListNetworksOutput {
    #[serde(default)]
    networks: Vec<NetworkSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSummary {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetNetworkOutput {
    network: NetworkDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkDetail {
    id: String,
    name: String,
    vpc_endpoint_service_name: Option<String>,
    framework_attributes: Option<NetworkFrameworkAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkFrameworkAttributes {
    fabric: Option<NetworkFabricAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkFabricAttributes {
    ordering_service_endpoint: Option<String>,
    edition: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListMembersOutput {
    #[serde(default)]
    members: Vec<MemberSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MemberSummary {
    id: String,
    name: String,
    #[serde(default)]
    is_owned: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetMemberOutput {
    member: MemberDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MemberDetail {
    id: String,
    name: String,
    network_id: String,
    framework_attributes: Option<MemberFrameworkAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MemberFrameworkAttributes {
    fabric: Option<MemberFabricAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MemberFabricAttributes {
    admin_username: Option<String>,
    ca_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListNodesOutput {
    #[serde(default)]
    nodes: Vec<NodeSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeSummary {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetNodeOutput {
    node: NodeDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeDetail {
    id: String,
    member_id: String,
    framework_attributes: Option<NodeFrameworkAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeFrameworkAttributes {
    fabric: Option<NodeFabricAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeFabricAttributes {
    peer_endpoint: Option<String>,
    peer_event_endpoint: Option<String>,
}

impl From<NetworkDetail> for Network {
    fn from(detail: NetworkDetail) -> Self {
        let fabric = detail.framework_attributes.and_then(|f| f.fabric);
        Self {
            id: detail.id,
            name: detail.name,
            vpc_endpoint_service_name: detail.vpc_endpoint_service_name,
            ordering_service_endpoint: fabric
                .as_ref()
                .and_then(|f| f.ordering_service_endpoint.clone()),
            edition: fabric.and_then(|f| f.edition),
        }
    }
}

impl From<NodeDetail> for Node {
    fn from(detail: NodeDetail) -> Self {
        let fabric = detail.framework_attributes.and_then(|f| f.fabric);
        Self {
            id: detail.id,
            member_id: detail.member_id,
            peer_endpoint: fabric.as_ref().and_then(|f| f.peer_endpoint.clone()),
            peer_event_endpoint: fabric.and_then(|f| f.peer_event_endpoint),
        }
    }
}

// ============================================================
// Directory Implementation
// ============================================================

/// Directory backed by `aws managedblockchain`
pub struct ManagedBlockchainDirectory {
    cli: AwsCli,
}

impl ManagedBlockchainDirectory {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl MemberDirectory for ManagedBlockchainDirectory {
    async fn list_networks(&self) -> Result<Vec<Network>, CloudError> {
        let output: ListNetworksOutput = self
            .cli
            .call_json(SERVICE, "list-networks", &["--status", AVAILABLE])
            .await?;

        debug!(count = output.networks.len(), "Listed networks");
        Ok(output
            .networks
            .into_iter()
            .map(|n| Network::new(n.id, n.name))
            .collect())
    }

    async fn network(&self, network_id: &str) -> Result<Network, CloudError> {
        let output: GetNetworkOutput = self
            .cli
            .call_json(SERVICE, "get-network", &["--network-id", network_id])
            .await?;
        Ok(output.network.into())
    }

    async fn list_members(
        &self,
        network_id: &str,
        ownership: Ownership,
    ) -> Result<Vec<Member>, CloudError> {
        let mut args = vec!["--network-id", network_id, "--status", AVAILABLE];
        match ownership {
            Ownership::Owned => args.push("--is-owned"),
            Ownership::NotOwned => args.push("--no-is-owned"),
            Ownership::Any => {}
        }

        let output: ListMembersOutput = self.cli.call_json(SERVICE, "list-members", &args).await?;

        debug!(network_id = %network_id, count = output.members.len(), "Listed members");
        Ok(output
            .members
            .into_iter()
            .map(|m| Member::new(network_id, m.id, m.name, m.is_owned))
            .filter(|m| ownership.admits(m))
            .collect())
    }

    async fn member(&self, network_id: &str, member_id: &str) -> Result<Member, CloudError> {
        let output: GetMemberOutput = self
            .cli
            .call_json(
                SERVICE,
                "get-member",
                &["--network-id", network_id, "--member-id", member_id],
            )
            .await?;

        let detail = output.member;
        let fabric = detail.framework_attributes.and_then(|f| f.fabric);

        // get-member does not report ownership; callers carry it over from
        // the listing the member was selected from.
        Ok(Member {
            id: detail.id,
            name: detail.name,
            network_id: detail.network_id,
            is_owned: false,
            admin_username: fabric.as_ref().and_then(|f| f.admin_username.clone()),
            ca_endpoint: fabric.and_then(|f| f.ca_endpoint),
        })
    }

    async fn list_nodes(
        &self,
        network_id: &str,
        member_id: &str,
    ) -> Result<Vec<Node>, CloudError> {
        let output: ListNodesOutput = self
            .cli
            .call_json(
                SERVICE,
                "list-nodes",
                &[
                    "--network-id",
                    network_id,
                    "--member-id",
                    member_id,
                    "--status",
                    AVAILABLE,
                ],
            )
            .await?;

        Ok(output
            .nodes
            .into_iter()
            .map(|n| Node::new(member_id, n.id))
            .collect())
    }

    async fn node(
        &self,
        network_id: &str,
        member_id: &str,
        node_id: &str,
    ) -> Result<Node, CloudError> {
        let output: GetNodeOutput = self
            .cli
            .call_json(
                SERVICE,
                "get-node",
                &[
                    "--network-id",
                    network_id,
                    "--member-id",
                    member_id,
                    "--node-id",
                    node_id,
                ],
            )
            .await?;
        Ok(output.node.into())
    }
}
