//! Fixed, in-memory directory

use async_trait::async_trait;

use super::MemberDirectory;
use crate::aws::CloudError;
use crate::model::{Member, Network, Node, Ownership};

const NOT_FOUND: &str = "ResourceNotFoundException";

/// Directory over a fixed set of networks, members and nodes
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    networks: Vec<Network>,
    members: Vec<Member>,
    nodes: Vec<Node>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.networks.push(network);
        self
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }
}

fn not_found(operation: &str, what: &str) -> CloudError {
    CloudError::with_code(operation, NOT_FOUND, format!("{what} not found"))
}

#[async_trait]
impl MemberDirectory for StaticDirectory {
    async fn list_networks(&self) -> Result<Vec<Network>, CloudError> {
        Ok(self.networks.clone())
    }

    async fn network(&self, network_id: &str) -> Result<Network, CloudError> {
        self.networks
            .iter()
            .find(|n| n.id == network_id)
            .cloned()
            .ok_or_else(|| not_found("get-network", network_id))
    }

    async fn list_members(
        &self,
        network_id: &str,
        ownership: Ownership,
    ) -> Result<Vec<Member>, CloudError> {
        if !self.networks.iter().any(|n| n.id == network_id) {
            return Err(not_found("list-members", network_id));
        }
        Ok(self
            .members
            .iter()
            .filter(|m| m.network_id == network_id && ownership.admits(m))
            .cloned()
            .collect())
    }

    async fn member(&self, network_id: &str, member_id: &str) -> Result<Member, CloudError> {
        self.members
            .iter()
            .find(|m| m.network_id == network_id && m.id == member_id)
            .cloned()
            .ok_or_else(|| not_found("get-member", member_id))
    }

    async fn list_nodes(
        &self,
        _network_id: &str,
        member_id: &str,
    ) -> Result<Vec<Node>, CloudError> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.member_id == member_id)
            .cloned()
            .collect())
    }

    async fn node(
        &self,
        _network_id: &str,
        member_id: &str,
        node_id: &str,
    ) -> Result<Node, CloudError> {
        self.nodes
            .iter()
            .find(|n| n.member_id == member_id && n.id == node_id)
            .cloned()
            .ok_or_else(|| not_found("get-node", node_id))
    }
}
