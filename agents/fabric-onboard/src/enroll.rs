//! Admin identity enrollment
//!
//! Runs `fabric-ca-client enroll` against the member's CA and fixes up the
//! resulting MSP directory so it can be used for admin operations.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Install location on the workshop AMI
pub const WELL_KNOWN_CA_CLIENT: &str =
    "/home/ec2-user/go/src/github.com/hyperledger/fabric-ca/bin/fabric-ca-client";

/// Resolved through `PATH` when nothing else is found
pub const CA_CLIENT_ON_PATH: &str = "fabric-ca-client";

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("failed to start {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("enrollment of {user} against {ca_endpoint} failed ({status}): {output}")]
    Failed {
        user: String,
        ca_endpoint: String,
        status: String,
        output: String,
    },

    #[error("failed to lay out admin MSP at {}: {source}", .path.display())]
    Layout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pick the CA client: configured path, else the well-known install, else `PATH`
pub fn resolve_binary(configured: Option<PathBuf>) -> PathBuf {
    if let Some(path) = configured {
        return path;
    }
    let well_known = PathBuf::from(WELL_KNOWN_CA_CLIENT);
    if well_known.exists() {
        well_known
    } else {
        PathBuf::from(CA_CLIENT_ON_PATH)
    }
}

pub struct Enrollment {
    binary: PathBuf,
    tls_chain: PathBuf,
    admin_msp: PathBuf,
}

impl Enrollment {
    pub fn new(binary: PathBuf, tls_chain: PathBuf, admin_msp: PathBuf) -> Self {
        Self {
            binary,
            tls_chain,
            admin_msp,
        }
    }

    /// Enroll the admin identity into the admin MSP directory
    pub async fn enroll(
        &self,
        admin_user: &str,
        password: &str,
        ca_endpoint: &str,
    ) -> Result<(), EnrollError> {
        let url = format!("https://{admin_user}:{password}@{ca_endpoint}");
        let redacted = format!("https://{admin_user}:****@{ca_endpoint}");

        info!(
            binary = %self.binary.display(),
            url = %redacted,
            msp = %self.admin_msp.display(),
            "🔐 Enrolling admin identity"
        );

        let output = Command::new(&self.binary)
            .arg("enroll")
            .arg("-u")
            .arg(&url)
            .arg("--tls.certfiles")
            .arg(&self.tls_chain)
            .arg("-M")
            .arg(&self.admin_msp)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EnrollError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        let captured = redact(&captured, password);
        debug!(output = %captured, "CA client output");

        if !output.status.success() {
            return Err(EnrollError::Failed {
                user: admin_user.to_string(),
                ca_endpoint: ca_endpoint.to_string(),
                status: output.status.to_string(),
                output: captured.trim().to_string(),
            });
        }

        self.promote_signcerts().await?;
        info!(msp = %self.admin_msp.display(), "✅ Admin certificate generated");
        Ok(())
    }

    /// Replace `admincerts/` with a copy of `signcerts/`
    async fn promote_signcerts(&self) -> Result<(), EnrollError> {
        let signcerts = self.admin_msp.join("signcerts");
        let admincerts = self.admin_msp.join("admincerts");

        match tokio::fs::remove_dir_all(&admincerts).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(EnrollError::Layout {
                    path: admincerts,
                    source,
                })
            }
        }

        copy_dir(&signcerts, &admincerts)
            .await
            .map_err(|source| EnrollError::Layout {
                path: admincerts.clone(),
                source,
            })
    }
}

fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        text.to_string()
    } else {
        text.replace(secret, "****")
    }
}

/// Copy the regular files of `from` into a new directory `to`
async fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(to).await?;
    let mut entries = tokio::fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::copy(entry.path(), to.join(entry.file_name())).await?;
        }
    }
    Ok(())
}
