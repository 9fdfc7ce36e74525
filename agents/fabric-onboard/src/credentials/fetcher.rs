//! Credential Fetcher
//!
//! Pulls every other member's public material into the local trust store.
//! Members that have not published yet are reported, not fatal: the exchange
//! is asynchronous and the operator simply re-runs the fetch later. A storage
//! outage or a local write failure aborts the whole call.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::keys::{CredentialKeys, RegionSuffix};
use super::trust_store::TrustStore;
use super::types::{FetchError, FetchReport, FetchedMember, MemberFailure};
use crate::directory::MemberDirectory;
use crate::layout::LocalLayout;
use crate::model::{Member, Ownership};
use crate::store::{ObjectStore, StoreError};

/// Member name of the network creator's placeholder organization
pub const PLACEHOLDER_MEMBER_NAME: &str = "AmazonManagedBlockchainMember";

/// Members excluded unless the caller supplies its own filter
pub fn default_exclusion(member: &Member) -> bool {
    member.name.contains("Ignore") || member.name == PLACEHOLDER_MEMBER_NAME
}

pub struct CredentialFetcher {
    store: Arc<dyn ObjectStore>,
    directory: Arc<dyn MemberDirectory>,
    layout: LocalLayout,
    trust_store: TrustStore,
    suffix: RegionSuffix,
}

impl CredentialFetcher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        directory: Arc<dyn MemberDirectory>,
        layout: LocalLayout,
        suffix: RegionSuffix,
    ) -> Self {
        Self {
            store,
            directory,
            trust_store: TrustStore::new(layout.clone()),
            layout,
            suffix,
        }
    }

    /// Fetch the material of every AVAILABLE, not-owned member of the network
    ///
    /// `self_member_id` and members matched by `exclude` are skipped.
    pub async fn fetch_all(
        &self,
        network_id: &str,
        self_member_id: &str,
        exclude: &(dyn Fn(&Member) -> bool + Send + Sync),
    ) -> Result<FetchReport, FetchError> {
        let members = self
            .directory
            .list_members(network_id, Ownership::NotOwned)
            .await
            .map_err(|source| FetchError::DirectoryUnavailable {
                network_id: network_id.to_string(),
                source,
            })?;

        let mut candidates = Vec::new();
        for member in members {
            if member.id == self_member_id {
                continue;
            }
            if exclude(&member) {
                info!(member_id = %member.id, name = %member.name, "Ignoring member");
                continue;
            }
            candidates.push(member);
        }

        info!(
            network_id = %network_id,
            candidates = candidates.len(),
            "Fetching public certificates of other members"
        );

        let mut fetched = Vec::new();
        let mut failures = Vec::new();
        let mut warnings = Vec::new();

        for member in &candidates {
            match self.fetch_member(network_id, member, &mut warnings).await {
                Ok(entry) => {
                    info!(member_id = %member.id, name = %member.name, "📥 Copied member certificates");
                    fetched.push(entry);
                }
                Err(error @ FetchError::PerMemberMissing { .. }) => {
                    warn!(
                        member_id = %member.id,
                        name = %member.name,
                        error = %error,
                        "Member has not published certificates yet"
                    );
                    failures.push(MemberFailure {
                        member_id: member.id.clone(),
                        name: member.name.clone(),
                        error,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(FetchReport {
            fetched,
            failures,
            warnings,
            candidates: candidates.len(),
            finished_at: Utc::now(),
        })
    }

    async fn fetch_member(
        &self,
        network_id: &str,
        member: &Member,
        warnings: &mut Vec<String>,
    ) -> Result<FetchedMember, FetchError> {
        let keys = CredentialKeys::new(network_id, &member.id, &self.suffix);

        // both objects must be present before the trust store is touched
        let admin_cert = self.get_required(&member.id, &keys.admin_cert()).await?;
        let ca_cert = self.get_required(&member.id, &keys.ca_cert()).await?;

        let trust_store_path = self
            .trust_store
            .replace(&member.id, &admin_cert, &ca_cert)
            .await
            .map_err(|source| FetchError::TrustStore {
                member_id: member.id.clone(),
                path: self.trust_store.entry_path(&member.id),
                source,
            })?;

        let peer_address = self.copy_peer_address(member, &keys, warnings).await?;

        Ok(FetchedMember {
            member_id: member.id.clone(),
            name: member.name.clone(),
            admin_cert,
            ca_cert,
            trust_store_path,
            peer_address,
        })
    }

    async fn get_required(&self, member_id: &str, key: &str) -> Result<Vec<u8>, FetchError> {
        match self.store.get(key).await {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::NotFound { .. }) => Err(FetchError::PerMemberMissing {
                member_id: member_id.to_string(),
                key: key.to_string(),
            }),
            Err(source) => Err(FetchError::StorageUnavailable {
                member_id: member_id.to_string(),
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Copy `peer_address.txt` to `~/environment/peer-address-{memberId}.txt`
    async fn copy_peer_address(
        &self,
        member: &Member,
        keys: &CredentialKeys,
        warnings: &mut Vec<String>,
    ) -> Result<Option<String>, FetchError> {
        let key = keys.peer_address();
        let bytes = match self.store.get(&key).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound { .. }) => {
                warn!(member_id = %member.id, "Member has not published a peer address");
                warnings.push(format!(
                    "{} ({}) has not published a peer address",
                    member.name, member.id
                ));
                return Ok(None);
            }
            Err(source) => {
                return Err(FetchError::StorageUnavailable {
                    member_id: member.id.clone(),
                    key,
                    source,
                })
            }
        };

        let path = self.layout.peer_address_file(&member.id);
        let local_error = |source: std::io::Error| FetchError::TrustStore {
            member_id: member.id.clone(),
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(self.layout.environment_dir())
            .await
            .map_err(local_error)?;
        tokio::fs::write(&path, &bytes).await.map_err(local_error)?;

        Ok(Some(String::from_utf8_lossy(&bytes).trim().to_string()))
    }
}
