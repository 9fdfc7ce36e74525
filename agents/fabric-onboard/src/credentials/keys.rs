//! Shared key scheme
//!
//! Every member publishes under `{networkId}/{memberId}/`. The layout must
//! stay byte-for-byte stable: other organizations' tooling reads it.

use std::fmt;

/// Region component of the CA certificate object name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSuffix(String);

impl RegionSuffix {
    /// `us-east-1` -> `us-east-1-amazonaws-com`
    pub fn from_region(region: &str) -> Self {
        Self(format!("{}-amazonaws-com", region.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RegionSuffix {
    fn default() -> Self {
        Self::from_region("us-east-1")
    }
}

impl fmt::Display for RegionSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object keys of one member's public material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialKeys {
    network_id: String,
    member_id: String,
    suffix: RegionSuffix,
}

impl CredentialKeys {
    pub fn new(network_id: &str, member_id: &str, suffix: &RegionSuffix) -> Self {
        Self {
            network_id: network_id.to_string(),
            member_id: member_id.to_string(),
            suffix: suffix.clone(),
        }
    }

    /// `{networkId}/{memberId}/`
    pub fn prefix(&self) -> String {
        format!("{}/{}/", self.network_id, self.member_id)
    }

    pub fn admin_cert(&self) -> String {
        format!("{}admin-msp/admincerts/cert.pem", self.prefix())
    }

    pub fn ca_cert(&self) -> String {
        format!(
            "{}admin-msp/cacerts/ca-{}-{}-{}.pem",
            self.prefix(),
            self.member_id,
            self.network_id,
            self.suffix
        )
    }

    pub fn peer_address(&self) -> String {
        format!("{}peer_address.txt", self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_scheme() {
        let keys = CredentialKeys::new("n-ABC", "m-XYZ", &RegionSuffix::from_region("us-east-1"));

        assert_eq!(keys.admin_cert(), "n-ABC/m-XYZ/admin-msp/admincerts/cert.pem");
        assert_eq!(
            keys.ca_cert(),
            "n-ABC/m-XYZ/admin-msp/cacerts/ca-m-XYZ-n-ABC-us-east-1-amazonaws-com.pem"
        );
        assert_eq!(keys.peer_address(), "n-ABC/m-XYZ/peer_address.txt");
    }

    #[test]
    fn test_region_suffix() {
        assert_eq!(RegionSuffix::default().as_str(), "us-east-1-amazonaws-com");
        assert_eq!(
            RegionSuffix::from_region("eu-west-1").to_string(),
            "eu-west-1-amazonaws-com"
        );
    }
}
