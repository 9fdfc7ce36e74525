//! Member Directory
//!
//! Read access to the managed blockchain control plane: which networks this
//! account belongs to, who the members are, and which peer nodes they run.

mod managed_blockchain;
mod static_directory;

pub use managed_blockchain::ManagedBlockchainDirectory;
pub use static_directory::StaticDirectory;

use async_trait::async_trait;

use crate::aws::CloudError;
use crate::model::{Member, Network, Node, Ownership};

/// Only AVAILABLE resources are ever returned by the listing calls.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn list_networks(&self) -> Result<Vec<Network>, CloudError>;

    async fn network(&self, network_id: &str) -> Result<Network, CloudError>;

    async fn list_members(
        &self,
        network_id: &str,
        ownership: Ownership,
    ) -> Result<Vec<Member>, CloudError>;

    async fn member(&self, network_id: &str, member_id: &str) -> Result<Member, CloudError>;

    async fn list_nodes(&self, network_id: &str, member_id: &str)
        -> Result<Vec<Node>, CloudError>;

    async fn node(
        &self,
        network_id: &str,
        member_id: &str,
        node_id: &str,
    ) -> Result<Node, CloudError>;
}
