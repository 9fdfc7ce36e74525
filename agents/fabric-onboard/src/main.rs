//! Fabric Onboarding Agent
//!
//! Prepares an EC2 instance to act for a member of a managed Hyperledger
//! Fabric network and exchanges public certificates with the other members.
//!
//! # Usage
//! ```bash
//! # Interactive setup: VPC endpoint, exports, admin enrollment, publish
//! fabric-onboard setup
//!
//! # Pull the certificates other members have published
//! source ~/fabric_exports && fabric-onboard copy-certs
//!
//! # Individual steps
//! fabric-onboard ensure-endpoint --network-id n-ABC
//! fabric-onboard publish --network-id n-ABC --member-id m-XYZ
//! fabric-onboard fetch --network-id n-ABC --member-id m-XYZ
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use fabric_onboard::credentials::FetchReport;
use fabric_onboard::network::{AmbiguityPolicy, Ec2Network, InstanceMetadata, PollPolicy};
use fabric_onboard::select::{PresetSelector, Selector, TerminalSelector};
use fabric_onboard::{
    AwsCli, Identifiers, LocalLayout, ManagedBlockchainDirectory, MemberDirectory,
    OnboardingSession, S3ObjectStore, SessionConfig,
};

/// Used by the workshop CA when the operator enters nothing
const DEFAULT_ADMIN_PASSWORD: &str = "Admin123";

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "fabric-onboard")]
#[command(about = "Managed Fabric network onboarding agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Shared bucket used to exchange public certificates
    #[arg(long, env = "CERTIFICATE_BUCKET", default_value = "reinvent2019-amb-artifacts-us-east-1")]
    bucket: String,

    /// AWS region of the network
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// AWS CLI profile
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Home directory holding the MSP directories (default: current user's)
    #[arg(long, env = "FABRIC_ONBOARD_HOME")]
    home: Option<PathBuf>,

    /// Seconds between VPC endpoint state checks
    #[arg(long, default_value = "3")]
    poll_interval_secs: u64,

    /// Maximum number of VPC endpoint state checks (0 = unbounded)
    #[arg(long, default_value = "200")]
    max_polls: u32,

    /// Give up waiting for the VPC endpoint after this many seconds
    #[arg(long, default_value = "900")]
    endpoint_timeout_secs: u64,

    /// Use the first endpoint when several match instead of failing
    #[arg(long)]
    use_first_endpoint: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full setup of this machine for one member
    Setup {
        /// Network to set up (skips the network menu)
        #[arg(long)]
        network_id: Option<String>,

        /// Member to set up (skips the member menu)
        #[arg(long)]
        member_id: Option<String>,

        /// Peer node to use (skips the peer menu)
        #[arg(long)]
        peer_id: Option<String>,

        /// Never prompt; sole candidates are picked automatically
        #[arg(long)]
        non_interactive: bool,

        /// CA admin password
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: Option<String>,

        /// TLS chain passed to the CA client
        #[arg(long, env = "FABRIC_TLS_CHAIN")]
        tls_chain: Option<PathBuf>,

        /// CA client binary
        #[arg(long, env = "FABRIC_CA_CLIENT")]
        ca_client: Option<PathBuf>,

        /// Home directory as mounted in the Fabric CLI container
        #[arg(long, default_value = "/opt/home")]
        container_home: String,
    },

    /// Copy other members' certificates (run after every member has set up)
    CopyCerts {
        #[arg(long, env = "NETWORKID")]
        network_id: Option<String>,

        #[arg(long, env = "MEMBERID")]
        member_id: Option<String>,

        /// Do not wait for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Ensure the VPC endpoint to a network exists and is available
    EnsureEndpoint {
        #[arg(long, env = "NETWORKID")]
        network_id: String,
    },

    /// Publish the local admin MSP certificates
    Publish {
        #[arg(long, env = "NETWORKID")]
        network_id: Option<String>,

        #[arg(long, env = "MEMBERID")]
        member_id: Option<String>,

        /// Peer endpoint to announce alongside the certificates
        #[arg(long, env = "PEERSERVICEENDPOINT")]
        peer_address: Option<String>,
    },

    /// Fetch other members' certificates and print a JSON summary
    Fetch {
        #[arg(long, env = "NETWORKID")]
        network_id: Option<String>,

        #[arg(long, env = "MEMBERID")]
        member_id: Option<String>,
    },
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!("🚀 Fabric onboarding agent starting...");

    let layout = match &cli.home {
        Some(home) => LocalLayout::new(home),
        None => LocalLayout::from_home_dir().context("Cannot determine the home directory")?,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            on_interrupt.cancel();
        }
    });

    let aws = AwsCli::new(Some(cli.region.clone()), cli.profile.clone());
    let directory: Arc<dyn MemberDirectory> = Arc::new(ManagedBlockchainDirectory::new(aws.clone()));
    let store = Arc::new(S3ObjectStore::new(aws.clone(), &cli.bucket));
    let network = Arc::new(Ec2Network::new(aws.clone(), InstanceMetadata::new()?));

    let mut config = SessionConfig::new(&cli.region, &layout);
    config.poll = PollPolicy::new(Duration::from_secs(cli.poll_interval_secs), cli.max_polls)
        .with_deadline(Duration::from_secs(cli.endpoint_timeout_secs));
    if cli.use_first_endpoint {
        config.ambiguity = AmbiguityPolicy::UseFirst;
    }

    info!(bucket = %cli.bucket, region = %cli.region, home = %layout.home().display(), "✅ Configuration loaded");

    match cli.command {
        Commands::Setup {
            network_id,
            member_id,
            peer_id,
            non_interactive,
            admin_password,
            tls_chain,
            ca_client,
            container_home,
        } => {
            if let Some(tls_chain) = tls_chain {
                config.tls_chain = tls_chain;
            }
            config.ca_client = ca_client;
            config.container_home = container_home;

            let session = OnboardingSession::new(directory, store, network, layout, config)
                .with_cancellation(cancel);

            let preset = PresetSelector {
                network_id,
                member_id,
                peer_id,
            };
            let interactive = !non_interactive
                && preset.network_id.is_none()
                && preset.member_id.is_none()
                && preset.peer_id.is_none();

            let password = match admin_password {
                Some(password) => password,
                None if interactive => prompt_password()?,
                None => DEFAULT_ADMIN_PASSWORD.to_string(),
            };

            let mut terminal;
            let mut preset = preset;
            let selector: &mut dyn Selector = if interactive {
                terminal = TerminalSelector::stdio();
                &mut terminal
            } else {
                &mut preset
            };

            let ctx = session.setup(selector, &password).await?;
            println!("✅ Environment set up for member {} ({})", ctx.member.name, ctx.member.id);
            println!("   Run 'source ~/fabric_exports' in every new shell.");
        }

        Commands::CopyCerts {
            network_id,
            member_id,
            yes,
        } => {
            let session = OnboardingSession::new(directory, store, network, layout, config);
            let ids = Identifiers::require(network_id, member_id)?;

            println!(
                "Using network {} and member {}.\n\
                 Make sure every other member has run setup before copying certificates.",
                ids.network_id, ids.member_id
            );
            if !yes {
                wait_for_enter("Press enter to continue...")?;
            }

            let report = session
                .copy_certs(Some(ids.network_id), Some(ids.member_id))
                .await?;
            print_report(&report);
        }

        Commands::EnsureEndpoint { network_id } => {
            let net = directory
                .network(&network_id)
                .await
                .with_context(|| format!("Failed to describe network {network_id}"))?;
            let session = OnboardingSession::new(directory, store, network, layout, config)
                .with_cancellation(cancel);

            let endpoint = session.ensure_endpoint(&net).await?;
            println!("✅ VPC endpoint {} is {}", endpoint.id, endpoint.state);
        }

        Commands::Publish {
            network_id,
            member_id,
            peer_address,
        } => {
            let session = OnboardingSession::new(directory, store, network, layout, config);
            let ids = Identifiers::require(network_id, member_id)?;

            session.publish(&ids, peer_address.as_deref()).await?;
            println!("✅ Published certificates of member {}", ids.member_id);
        }

        Commands::Fetch {
            network_id,
            member_id,
        } => {
            let session = OnboardingSession::new(directory, store, network, layout, config);
            let report = session.copy_certs(network_id, member_id).await?;

            let summary = serde_json::json!({
                "status": report.status().to_string(),
                "candidates": report.candidates,
                "fetched": report.fetched.iter().map(|m| serde_json::json!({
                    "member_id": m.member_id,
                    "name": m.name,
                    "trust_store": m.trust_store_path.display().to_string(),
                    "peer_address": m.peer_address,
                })).collect::<Vec<_>>(),
                "missing": report.failures.iter().map(|f| serde_json::json!({
                    "member_id": f.member_id,
                    "name": f.name,
                    "error": f.error.to_string(),
                })).collect::<Vec<_>>(),
                "warnings": report.warnings,
                "finished_at": report.finished_at.to_rfc3339(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn print_report(report: &FetchReport) {
    use fabric_onboard::FetchStatus;

    match report.status() {
        FetchStatus::NoCandidates => {
            println!("No other members in this network to copy certificates from.");
        }
        FetchStatus::NothingPublished => {
            println!(
                "Did not find any member certificates. Ask the other participants to run \
                 setup, then run this again."
            );
        }
        FetchStatus::Partial | FetchStatus::Complete => {
            println!("Found the following members:\n{}", report.fetched_labels().join("\n"));
            if !report.failures.is_empty() {
                println!(
                    "Still missing: {}. Ask them to run setup and run this again.",
                    report
                        .failures
                        .iter()
                        .map(|f| format!("{}:{}", f.name, f.member_id))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
    }
    for warning in &report.warnings {
        println!("⚠️  {warning}");
    }
}

fn wait_for_enter(message: &str) -> Result<()> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn prompt_password() -> Result<String> {
    print!("Please enter your admin password (default '{DEFAULT_ADMIN_PASSWORD}'): ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim();
    Ok(if password.is_empty() {
        DEFAULT_ADMIN_PASSWORD.to_string()
    } else {
        password.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "fabric-onboard",
            "--bucket",
            "shared-certs",
            "--max-polls",
            "10",
            "fetch",
            "--network-id",
            "n-1",
            "--member-id",
            "m-1",
        ])
        .unwrap();

        assert_eq!(cli.bucket, "shared-certs");
        assert_eq!(cli.max_polls, 10);
        match cli.command {
            Commands::Fetch {
                network_id,
                member_id,
            } => {
                assert_eq!(network_id.as_deref(), Some("n-1"));
                assert_eq!(member_id.as_deref(), Some("m-1"));
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_ensure_endpoint_requires_network() {
        std::env::remove_var("NETWORKID");
        assert!(Cli::try_parse_from(["fabric-onboard", "ensure-endpoint"]).is_err());
    }
}
