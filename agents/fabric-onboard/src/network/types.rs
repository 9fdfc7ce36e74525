//! Private connectivity types
//!
//! Observed and desired state for the interface VPC endpoint that gives this
//! host a private path to the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::aws::CloudError;

/// TCP port range the network's peers, CA and orderer listen on
pub const PEER_PORT_RANGE: (u16, u16) = (30000, 31000);

/// Lifecycle state of a private endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Pending,
    Available,
    Failed,
    Absent,
}

impl EndpointState {
    /// Map an EC2 endpoint state onto the lifecycle
    ///
    /// EC2 reports `pendingAcceptance`, `pending`, `available`, `deleting`,
    /// `deleted`, `rejected`, `failed` and `expired`.
    pub fn from_ec2(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pending" | "pendingacceptance" => EndpointState::Pending,
            "available" => EndpointState::Available,
            "deleting" | "deleted" => EndpointState::Absent,
            _ => EndpointState::Failed,
        }
    }
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointState::Pending => write!(f, "pending"),
            EndpointState::Available => write!(f, "available"),
            EndpointState::Failed => write!(f, "failed"),
            EndpointState::Absent => write!(f, "absent"),
        }
    }
}

/// An interface VPC endpoint as observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateEndpoint {
    pub id: String,
    pub service_name: String,
    pub vpc_id: String,
    pub subnet_ids: BTreeSet<String>,
    pub security_group_ids: BTreeSet<String>,
    pub state: EndpointState,
}

impl PrivateEndpoint {
    pub fn has_subnet(&self, subnet_id: &str) -> bool {
        self.subnet_ids.contains(subnet_id)
    }

    /// Desired groups not yet attached, in the order they were requested
    pub fn missing_security_groups(&self, wanted: &[String]) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for group in wanted {
            if !self.security_group_ids.contains(group) && !missing.contains(group) {
                missing.push(group.clone());
            }
        }
        missing
    }
}

/// Where this host sits in the VPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPlacement {
    pub instance_id: String,
    pub vpc_id: String,
    pub subnet_id: String,
    /// In the order EC2 reports them; the first is the primary group
    pub security_group_ids: Vec<String>,
}

impl HostPlacement {
    pub fn primary_security_group(&self) -> Option<&str> {
        self.security_group_ids.first().map(String::as_str)
    }
}

/// What the endpoint must look like once reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEndpoint {
    pub service_name: String,
    pub vpc_id: String,
    pub subnet_id: String,
    /// The first group also receives the peer ingress rule
    pub security_group_ids: Vec<String>,
}

impl DesiredEndpoint {
    /// Attach the endpoint to this host's subnet and primary security group
    pub fn for_host(service_name: impl Into<String>, host: &HostPlacement) -> Self {
        Self {
            service_name: service_name.into(),
            vpc_id: host.vpc_id.clone(),
            subnet_id: host.subnet_id.clone(),
            security_group_ids: host
                .primary_security_group()
                .map(|g| vec![g.to_string()])
                .unwrap_or_default(),
        }
    }

    pub fn primary_security_group(&self) -> Option<&str> {
        self.security_group_ids.first().map(String::as_str)
    }
}

/// Parameters for creating a new interface endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEndpointRequest {
    pub service_name: String,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub client_token: String,
    pub private_dns_enabled: bool,
}

/// A security group ingress permission from another security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub source_group_id: String,
}

impl IngressRule {
    /// Peer traffic between members of `group_id`
    pub fn peer_traffic(group_id: &str) -> Self {
        Self {
            protocol: "tcp".to_string(),
            from_port: PEER_PORT_RANGE.0,
            to_port: PEER_PORT_RANGE.1,
            source_group_id: group_id.to_string(),
        }
    }

    /// Whether an existing rule already admits everything this one would
    pub fn is_covered_by(&self, existing: &IngressRule) -> bool {
        let protocol_matches = existing.protocol == "-1"
            || existing.protocol.eq_ignore_ascii_case(&self.protocol);

        protocol_matches
            && existing.source_group_id == self.source_group_id
            && existing.from_port <= self.from_port
            && existing.to_port >= self.to_port
    }
}

/// Failures of the endpoint reconciliation
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("VPC endpoint {endpoint_id} reached terminal state '{state}'")]
    EndpointFailed {
        endpoint_id: String,
        state: EndpointState,
    },

    #[error("network call failed while {action}: {source}")]
    NetworkUnavailable {
        action: String,
        source: CloudError,
    },

    #[error(
        "{} VPC endpoints match service {service_name}: {}",
        .endpoint_ids.len(),
        .endpoint_ids.join(", ")
    )]
    AmbiguousEndpoint {
        service_name: String,
        endpoint_ids: Vec<String>,
    },

    #[error("VPC endpoint {endpoint_id} still '{last_state}' after {attempts} polls")]
    TimedOut {
        endpoint_id: String,
        last_state: EndpointState,
        attempts: u32,
    },

    #[error("wait for VPC endpoint {endpoint_id} cancelled (last state '{last_state}')")]
    Cancelled {
        endpoint_id: String,
        last_state: EndpointState,
    },
}

impl ProvisionError {
    pub(crate) fn unavailable(action: impl Into<String>, source: CloudError) -> Self {
        ProvisionError::NetworkUnavailable {
            action: action.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(subnets: &[&str], groups: &[&str]) -> PrivateEndpoint {
        PrivateEndpoint {
            id: "vpce-1".to_string(),
            service_name: "svc".to_string(),
            vpc_id: "vpc-1".to_string(),
            subnet_ids: subnets.iter().map(|s| s.to_string()).collect(),
            security_group_ids: groups.iter().map(|s| s.to_string()).collect(),
            state: EndpointState::Available,
        }
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(EndpointState::from_ec2("pending"), EndpointState::Pending);
        assert_eq!(EndpointState::from_ec2("pendingAcceptance"), EndpointState::Pending);
        assert_eq!(EndpointState::from_ec2("Available"), EndpointState::Available);
        assert_eq!(EndpointState::from_ec2("deleted"), EndpointState::Absent);
        assert_eq!(EndpointState::from_ec2("rejected"), EndpointState::Failed);
        assert_eq!(EndpointState::from_ec2("failed"), EndpointState::Failed);
        assert_eq!(EndpointState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_missing_security_groups() {
        let ep = endpoint(&["subnet-a"], &["sg-1", "sg-2"]);
        let wanted = vec!["sg-2".to_string(), "sg-3".to_string(), "sg-3".to_string()];
        assert_eq!(ep.missing_security_groups(&wanted), vec!["sg-3".to_string()]);
        assert!(ep.has_subnet("subnet-a"));
        assert!(!ep.has_subnet("subnet-b"));
    }

    #[test]
    fn test_desired_from_host() {
        let host = HostPlacement {
            instance_id: "i-1".to_string(),
            vpc_id: "vpc-1".to_string(),
            subnet_id: "subnet-a".to_string(),
            security_group_ids: vec!["sg-1".to_string(), "sg-2".to_string()],
        };
        let desired = DesiredEndpoint::for_host("svc", &host);
        assert_eq!(desired.security_group_ids, vec!["sg-1".to_string()]);
        assert_eq!(desired.primary_security_group(), Some("sg-1"));
        assert_eq!(desired.vpc_id, "vpc-1");
    }

    #[test]
    fn test_rule_coverage() {
        let wanted = IngressRule::peer_traffic("sg-1");

        assert!(wanted.is_covered_by(&IngressRule::peer_traffic("sg-1")));
        assert!(wanted.is_covered_by(&IngressRule {
            protocol: "-1".to_string(),
            from_port: 0,
            to_port: 65535,
            source_group_id: "sg-1".to_string(),
        }));
        assert!(!wanted.is_covered_by(&IngressRule::peer_traffic("sg-2")));
        assert!(!wanted.is_covered_by(&IngressRule {
            protocol: "tcp".to_string(),
            from_port: 30000,
            to_port: 30500,
            source_group_id: "sg-1".to_string(),
        }));
    }

    #[test]
    fn test_ambiguity_message_names_endpoints() {
        let err = ProvisionError::AmbiguousEndpoint {
            service_name: "svc".to_string(),
            endpoint_ids: vec!["vpce-1".to_string(), "vpce-2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "2 VPC endpoints match service svc: vpce-1, vpce-2"
        );
    }
}
