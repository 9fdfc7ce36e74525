//! Environment export file
//!
//! `~/fabric_exports`, sourced by the operator's shell (and the Fabric CLI
//! container) in every later session.

use std::path::Path;
use tracing::info;

use crate::model::{Member, Network, Node};

/// Values written to the export file, in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricExports {
    pub ca_file: String,
    pub network_id: String,
    pub member_id: String,
    pub msp: String,
    pub msp_path: String,
    pub admin_user: String,
    pub ca_service_endpoint: String,
    pub orderer: String,
    pub peer_node_id: String,
    pub peer: String,
    pub peer_event_endpoint: String,
    pub vpc_endpoint_service_name: String,
}

impl FabricExports {
    /// Collect the exports of the chosen network, member and peer
    ///
    /// `container_home` is where the home directory is mounted inside the
    /// Fabric CLI container (e.g. `/opt/home`).
    pub fn collect(network: &Network, member: &Member, node: &Node, container_home: &str) -> Self {
        let container_home = container_home.trim_end_matches('/');
        let or_empty = |v: &Option<String>| v.clone().unwrap_or_default();

        Self {
            ca_file: format!("{container_home}/managedblockchain-tls-chain.pem"),
            network_id: network.id.clone(),
            member_id: member.id.clone(),
            msp: member.id.clone(),
            msp_path: format!("{container_home}/admin-msp"),
            admin_user: or_empty(&member.admin_username),
            ca_service_endpoint: or_empty(&member.ca_endpoint),
            orderer: or_empty(&network.ordering_service_endpoint),
            peer_node_id: node.id.clone(),
            peer: or_empty(&node.peer_endpoint),
            peer_event_endpoint: or_empty(&node.peer_event_endpoint),
            vpc_endpoint_service_name: or_empty(&network.vpc_endpoint_service_name),
        }
    }

    /// Key/value pairs in the fixed export order
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("CAFILE", self.ca_file.as_str()),
            ("NETWORKID", self.network_id.as_str()),
            ("MEMBERID", self.member_id.as_str()),
            ("MSP", self.msp.as_str()),
            ("MSP_PATH", self.msp_path.as_str()),
            ("ADMINUSER", self.admin_user.as_str()),
            ("CASERVICEENDPOINT", self.ca_service_endpoint.as_str()),
            ("ORDERER", self.orderer.as_str()),
            ("ORDERINGSERVICEENDPOINT", self.orderer.as_str()),
            ("PEERNODEID", self.peer_node_id.as_str()),
            ("PEER", self.peer.as_str()),
            ("PEERSERVICEENDPOINT", self.peer.as_str()),
            ("PEEREVENTENDPOINT", self.peer_event_endpoint.as_str()),
            ("VPCENDPOINTSERVICENAME", self.vpc_endpoint_service_name.as_str()),
        ]
    }

    pub fn render(&self) -> String {
        self.entries()
            .into_iter()
            .map(|(key, value)| format!("export {key}={value}\n"))
            .collect()
    }

    /// Write the export file, replacing any previous one
    pub async fn write(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.render()).await?;
        info!(path = %path.display(), "📝 Wrote environment exports");
        Ok(())
    }
}
