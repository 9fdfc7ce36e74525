//! Credential Publisher
//!
//! Announces this member's admin certificate, CA root and peer address
//! through the shared object store. Objects are written public-read so other
//! organizations can fetch them without credentials for this account.

use std::sync::Arc;
use tracing::info;

use super::keys::{CredentialKeys, RegionSuffix};
use super::types::{CredentialBundle, PublishError};
use crate::store::ObjectStore;

pub struct CredentialPublisher {
    store: Arc<dyn ObjectStore>,
    suffix: RegionSuffix,
}

impl CredentialPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, suffix: RegionSuffix) -> Self {
        Self { store, suffix }
    }

    /// Publish the bundle, overwriting a previous announcement
    ///
    /// Every CA root is written to the same key, so the last one (by file
    /// name) is what other members see.
    pub async fn publish(
        &self,
        network_id: &str,
        member_id: &str,
        bundle: &CredentialBundle,
    ) -> Result<(), PublishError> {
        let keys = CredentialKeys::new(network_id, member_id, &self.suffix);

        let admin_key = keys.admin_cert();
        self.put(&admin_key, &bundle.admin_cert).await?;
        info!(
            member_id = %member_id,
            location = %self.store.location(&admin_key),
            "📤 Published admin certificate"
        );

        let ca_key = keys.ca_cert();
        for ca in &bundle.ca_certs {
            self.put(&ca_key, &ca.bytes).await?;
            info!(
                member_id = %member_id,
                file = %ca.file_name,
                location = %self.store.location(&ca_key),
                "📤 Published CA certificate"
            );
        }

        Ok(())
    }

    /// Publish the peer endpoint other members should dial
    pub async fn publish_address(
        &self,
        network_id: &str,
        member_id: &str,
        peer_endpoint: &str,
    ) -> Result<(), PublishError> {
        let key = CredentialKeys::new(network_id, member_id, &self.suffix).peer_address();
        self.put(&key, peer_endpoint.as_bytes()).await?;

        info!(
            member_id = %member_id,
            location = %self.store.location(&key),
            "📤 Published peer address"
        );
        Ok(())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), PublishError> {
        self.store
            .put(key, bytes, true)
            .await
            .map_err(|source| PublishError::StorageUnavailable {
                key: key.to_string(),
                source,
            })
    }
}
