//! Local trust store
//!
//! `~/{memberId}-msp/{admincerts/cert.pem, cacerts/cacert.pem}`.
//!
//! An entry is replaced as a whole: the new version is written into a staging
//! directory next to it, the current one is renamed away, the staging
//! directory is renamed into place and only then is the old one removed.
//! A reader sees either the old or the new version, never a mix.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::layout::LocalLayout;

#[derive(Debug, Clone)]
pub struct TrustStore {
    layout: LocalLayout,
}

impl TrustStore {
    pub fn new(layout: LocalLayout) -> Self {
        Self { layout }
    }

    pub fn entry_path(&self, member_id: &str) -> PathBuf {
        self.layout.member_msp(member_id)
    }

    /// Replace the entry of `member_id` and return its path
    pub async fn replace(
        &self,
        member_id: &str,
        admin_cert: &[u8],
        ca_cert: &[u8],
    ) -> io::Result<PathBuf> {
        let target = self.entry_path(member_id);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.home().to_path_buf());
        tokio::fs::create_dir_all(&parent).await?;

        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let staging = parent.join(format!(".{member_id}-msp.staging-{nonce}"));
        let retired = parent.join(format!(".{member_id}-msp.old-{nonce}"));

        if let Err(e) = write_entry(&staging, admin_cert, ca_cert).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        let had_previous = tokio::fs::try_exists(&target).await?;
        if had_previous {
            if let Err(e) = tokio::fs::rename(&target, &retired).await {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        }

        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            // put the previous version back so the entry is never left empty
            if had_previous {
                let _ = tokio::fs::rename(&retired, &target).await;
            }
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        if had_previous {
            if let Err(e) = tokio::fs::remove_dir_all(&retired).await {
                warn!(path = %retired.display(), error = %e, "Failed to remove previous trust store entry");
            }
        }

        debug!(member_id = %member_id, path = %target.display(), "Trust store entry replaced");
        Ok(target)
    }
}

async fn write_entry(dir: &Path, admin_cert: &[u8], ca_cert: &[u8]) -> io::Result<()> {
    let admincerts = dir.join("admincerts");
    let cacerts = dir.join("cacerts");
    tokio::fs::create_dir_all(&admincerts).await?;
    tokio::fs::create_dir_all(&cacerts).await?;
    tokio::fs::write(admincerts.join("cert.pem"), admin_cert).await?;
    tokio::fs::write(cacerts.join("cacert.pem"), ca_cert).await?;
    Ok(())
}
