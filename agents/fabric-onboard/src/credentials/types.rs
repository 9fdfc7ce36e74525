//! Types for the public credential exchange
//!
//! A member announces its admin certificate and CA root through the shared
//! object store; every other member pulls them into a local trust store.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aws::CloudError;
use crate::store::StoreError;

/// One CA root certificate found in `cacerts/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaCertificate {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Public trust material of one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    /// Contents of `admincerts/cert.pem`
    pub admin_cert: Vec<u8>,
    /// Regular files of `cacerts/`, sorted by file name
    pub ca_certs: Vec<CaCertificate>,
}

impl CredentialBundle {
    pub fn new(admin_cert: Vec<u8>, ca_certs: Vec<CaCertificate>) -> Self {
        Self {
            admin_cert,
            ca_certs,
        }
    }

    /// Read the bundle out of an enrolled admin MSP directory
    ///
    /// Fails before anything is published if either part is missing.
    pub async fn load(admin_msp_dir: &Path) -> Result<Self, PublishError> {
        let admin_cert_path = admin_msp_dir.join("admincerts").join("cert.pem");
        let admin_cert = tokio::fs::read(&admin_cert_path)
            .await
            .map_err(|_| PublishError::LocalBundleMissing {
                path: admin_cert_path.clone(),
            })?;

        let cacerts_dir = admin_msp_dir.join("cacerts");
        let missing_cacerts = || PublishError::LocalBundleMissing {
            path: cacerts_dir.clone(),
        };

        let mut entries = tokio::fs::read_dir(&cacerts_dir)
            .await
            .map_err(|_| missing_cacerts())?;

        let mut ca_certs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|_| missing_cacerts())? {
            let file_type = entry.file_type().await.map_err(|_| missing_cacerts())?;
            if !file_type.is_file() {
                continue;
            }
            let bytes = tokio::fs::read(entry.path())
                .await
                .map_err(|_| missing_cacerts())?;
            ca_certs.push(CaCertificate {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                bytes,
            });
        }

        if ca_certs.is_empty() {
            return Err(missing_cacerts());
        }
        ca_certs.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        Ok(Self {
            admin_cert,
            ca_certs,
        })
    }
}

/// Errors while announcing this member's material
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("local credential material missing: {}", .path.display())]
    LocalBundleMissing { path: PathBuf },

    #[error("failed to publish {key}: {source}")]
    StorageUnavailable {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Errors while collecting other members' material
#[derive(Debug, Error)]
pub enum FetchError {
    /// Recorded per member; the fetch carries on with the next one
    #[error("member {member_id} has not published {key}")]
    PerMemberMissing { member_id: String, key: String },

    #[error("object store unavailable while fetching {key} of member {member_id}: {source}")]
    StorageUnavailable {
        member_id: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("cannot list members of network {network_id}: {source}")]
    DirectoryUnavailable {
        network_id: String,
        #[source]
        source: CloudError,
    },

    #[error("cannot write trust store for member {member_id} at {}: {source}", .path.display())]
    TrustStore {
        member_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Material retrieved for one member
#[derive(Debug, Clone)]
pub struct FetchedMember {
    pub member_id: String,
    pub name: String,
    pub admin_cert: Vec<u8>,
    pub ca_cert: Vec<u8>,
    /// `~/{memberId}-msp`
    pub trust_store_path: PathBuf,
    /// Published peer endpoint, if the member announced one
    pub peer_address: Option<String>,
}

/// A candidate whose material could not be retrieved
#[derive(Debug)]
pub struct MemberFailure {
    pub member_id: String,
    pub name: String,
    pub error: FetchError,
}

/// Overall outcome of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// No other members to fetch from
    NoCandidates,
    /// Candidates exist but none has published yet
    NothingPublished,
    /// Some candidates fetched, some missing
    Partial,
    Complete,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::NoCandidates => write!(f, "no-candidates"),
            FetchStatus::NothingPublished => write!(f, "nothing-published"),
            FetchStatus::Partial => write!(f, "partial"),
            FetchStatus::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Debug)]
pub struct FetchReport {
    pub fetched: Vec<FetchedMember>,
    pub failures: Vec<MemberFailure>,
    /// Non-fatal per-member notes (e.g. no peer address yet)
    pub warnings: Vec<String>,
    /// Members considered after self and exclusions were dropped
    pub candidates: usize,
    pub finished_at: DateTime<Utc>,
}

impl FetchReport {
    pub fn status(&self) -> FetchStatus {
        if self.candidates == 0 {
            FetchStatus::NoCandidates
        } else if self.fetched.is_empty() {
            FetchStatus::NothingPublished
        } else if self.failures.is_empty() {
            FetchStatus::Complete
        } else {
            FetchStatus::Partial
        }
    }

    /// `Name:Id` of every fetched member
    pub fn fetched_labels(&self) -> Vec<String> {
        self.fetched
            .iter()
            .map(|m| format!("{}:{}", m.name, m.member_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(candidates: usize, fetched: usize, failures: usize) -> FetchReport {
        let member = |i: usize| FetchedMember {
            member_id: format!("m-{i}"),
            name: format!("Org{i}"),
            admin_cert: Vec::new(),
            ca_cert: Vec::new(),
            trust_store_path: PathBuf::new(),
            peer_address: None,
        };
        let failure = |i: usize| MemberFailure {
            member_id: format!("m-f{i}"),
            name: format!("Late{i}"),
            error: FetchError::PerMemberMissing {
                member_id: format!("m-f{i}"),
                key: "k".to_string(),
            },
        };

        FetchReport {
            fetched: (0..fetched).map(member).collect(),
            failures: (0..failures).map(failure).collect(),
            warnings: Vec::new(),
            candidates,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_fetch_status() {
        assert_eq!(report(0, 0, 0).status(), FetchStatus::NoCandidates);
        assert_eq!(report(2, 0, 2).status(), FetchStatus::NothingPublished);
        assert_eq!(report(3, 2, 1).status(), FetchStatus::Partial);
        assert_eq!(report(2, 2, 0).status(), FetchStatus::Complete);
        assert_eq!(report(3, 2, 1).fetched_labels(), vec!["Org0:m-0", "Org1:m-1"]);
    }

    #[tokio::test]
    async fn test_load_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let msp = dir.path().join("admin-msp");
        tokio::fs::create_dir_all(msp.join("admincerts")).await.unwrap();
        tokio::fs::create_dir_all(msp.join("cacerts").join("nested")).await.unwrap();
        tokio::fs::write(msp.join("admincerts").join("cert.pem"), b"ADMIN").await.unwrap();
        tokio::fs::write(msp.join("cacerts").join("b.pem"), b"CA-B").await.unwrap();
        tokio::fs::write(msp.join("cacerts").join("a.pem"), b"CA-A").await.unwrap();

        let bundle = CredentialBundle::load(&msp).await.unwrap();

        assert_eq!(bundle.admin_cert, b"ADMIN");
        let names: Vec<&str> = bundle.ca_certs.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pem", "b.pem"]);
    }

    #[tokio::test]
    async fn test_load_bundle_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let msp = dir.path().join("admin-msp");

        let err = CredentialBundle::load(&msp).await.unwrap_err();
        assert!(matches!(err, PublishError::LocalBundleMissing { ref path } if path.ends_with("cert.pem")));

        tokio::fs::create_dir_all(msp.join("admincerts")).await.unwrap();
        tokio::fs::create_dir_all(msp.join("cacerts")).await.unwrap();
        tokio::fs::write(msp.join("admincerts").join("cert.pem"), b"ADMIN").await.unwrap();

        let err = CredentialBundle::load(&msp).await.unwrap_err();
        assert!(matches!(err, PublishError::LocalBundleMissing { ref path } if path.ends_with("cacerts")));
    }
}
