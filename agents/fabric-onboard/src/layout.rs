//! Local filesystem layout under the operator's home directory

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalLayout {
    home: PathBuf,
}

impl LocalLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Layout rooted at the current user's home directory
    pub fn from_home_dir() -> Option<Self> {
        home::home_dir().map(Self::new)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `~/admin-msp`, produced by enrollment
    pub fn admin_msp(&self) -> PathBuf {
        self.home.join("admin-msp")
    }

    /// `~/{memberId}-msp`, the trust store entry of another member
    pub fn member_msp(&self, member_id: &str) -> PathBuf {
        self.home.join(format!("{member_id}-msp"))
    }

    pub fn environment_dir(&self) -> PathBuf {
        self.home.join("environment")
    }

    /// `~/environment/peer-address-{memberId}.txt`
    pub fn peer_address_file(&self, member_id: &str) -> PathBuf {
        self.environment_dir()
            .join(format!("peer-address-{member_id}.txt"))
    }

    /// `~/fabric_exports`
    pub fn exports_file(&self) -> PathBuf {
        self.home.join("fabric_exports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = LocalLayout::new("/home/ec2-user");

        assert_eq!(layout.admin_msp(), PathBuf::from("/home/ec2-user/admin-msp"));
        assert_eq!(layout.member_msp("m-1"), PathBuf::from("/home/ec2-user/m-1-msp"));
        assert_eq!(
            layout.peer_address_file("m-1"),
            PathBuf::from("/home/ec2-user/environment/peer-address-m-1.txt")
        );
        assert_eq!(layout.exports_file(), PathBuf::from("/home/ec2-user/fabric_exports"));
    }
}
