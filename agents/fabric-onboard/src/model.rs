//! Network, member and peer node types
//!
//! Owned by the managed blockchain control plane; this crate only reads them.

use serde::{Deserialize, Serialize};

/// A managed Fabric network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    /// Endpoint service other infrastructure dials to reach the network
    pub vpc_endpoint_service_name: Option<String>,
    pub ordering_service_endpoint: Option<String>,
    pub edition: Option<String>,
}

impl Network {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            vpc_endpoint_service_name: None,
            ordering_service_endpoint: None,
            edition: None,
        }
    }
}

/// One organization participating in a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub network_id: String,
    /// Owned by the calling account ("self") rather than a peer organization
    pub is_owned: bool,
    pub admin_username: Option<String>,
    pub ca_endpoint: Option<String>,
}

impl Member {
    pub fn new(
        network_id: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        is_owned: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            network_id: network_id.into(),
            is_owned,
            admin_username: None,
            ca_endpoint: None,
        }
    }
}

/// Which members a listing should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    NotOwned,
    Any,
}

impl Ownership {
    pub fn admits(&self, member: &Member) -> bool {
        match self {
            Ownership::Owned => member.is_owned,
            Ownership::NotOwned => !member.is_owned,
            Ownership::Any => true,
        }
    }
}

/// A peer node run by a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub member_id: String,
    pub peer_endpoint: Option<String>,
    pub peer_event_endpoint: Option<String>,
}

impl Node {
    pub fn new(member_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            member_id: member_id.into(),
            peer_endpoint: None,
            peer_event_endpoint: None,
        }
    }
}
