//! Onboarding sessions
//!
//! The two end-to-end flows an operator runs:
//!
//! - `setup`: choose network, member and peer; ensure the VPC endpoint; write
//!   the exports file; enroll the admin identity; publish certificates and the
//!   peer address.
//! - `copy-certs`: pull every other member's published material.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::credentials::{
    default_exclusion, CredentialBundle, CredentialFetcher, CredentialPublisher, FetchReport,
    RegionSuffix,
};
use crate::directory::MemberDirectory;
use crate::enroll::{resolve_binary, Enrollment};
use crate::exports::FabricExports;
use crate::layout::LocalLayout;
use crate::model::{Member, Network, Node, Ownership};
use crate::network::{
    AmbiguityPolicy, DesiredEndpoint, EndpointReconciler, NetworkMutator, NetworkResourceProbe,
    PollPolicy, PrivateEndpoint,
};
use crate::select::{select, CandidateKind, Selector};
use crate::store::ObjectStore;

/// Inputs that must be present before anything remote is attempted
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error(
        "{} not set; run 'source ~/fabric_exports' or pass them explicitly",
        .missing.join(" and ")
    )]
    MissingIdentifiers { missing: Vec<&'static str> },
}

/// Network and member this machine acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifiers {
    pub network_id: String,
    pub member_id: String,
}

impl Identifiers {
    /// Both ids must be present and non-empty
    pub fn require(
        network_id: Option<String>,
        member_id: Option<String>,
    ) -> Result<Self, PreconditionError> {
        let network_id = network_id.filter(|s| !s.trim().is_empty());
        let member_id = member_id.filter(|s| !s.trim().is_empty());

        match (network_id, member_id) {
            (Some(network_id), Some(member_id)) => Ok(Self {
                network_id,
                member_id,
            }),
            (network_id, member_id) => {
                let mut missing = Vec::new();
                if network_id.is_none() {
                    missing.push("NETWORKID");
                }
                if member_id.is_none() {
                    missing.push("MEMBERID");
                }
                Err(PreconditionError::MissingIdentifiers { missing })
            }
        }
    }
}

/// Settings shared by both flows
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub region: String,
    /// Home directory as mounted in the Fabric CLI container
    pub container_home: String,
    /// TLS chain passed to the CA client
    pub tls_chain: PathBuf,
    /// Explicit CA client binary
    pub ca_client: Option<PathBuf>,
    pub poll: PollPolicy,
    pub ambiguity: AmbiguityPolicy,
}

impl SessionConfig {
    pub fn new(region: impl Into<String>, layout: &LocalLayout) -> Self {
        Self {
            region: region.into(),
            container_home: "/opt/home".to_string(),
            tls_chain: layout.home().join("managedblockchain-tls-chain.pem"),
            ca_client: None,
            poll: PollPolicy::default(),
            ambiguity: AmbiguityPolicy::default(),
        }
    }
}

/// Network, member and peer chosen during setup, with their details
#[derive(Debug, Clone)]
pub struct SetupContext {
    pub network: Network,
    pub member: Member,
    pub node: Node,
}

pub struct OnboardingSession {
    directory: Arc<dyn MemberDirectory>,
    store: Arc<dyn ObjectStore>,
    probe: Arc<dyn NetworkResourceProbe>,
    mutator: Arc<dyn NetworkMutator>,
    layout: LocalLayout,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl OnboardingSession {
    pub fn new<N>(
        directory: Arc<dyn MemberDirectory>,
        store: Arc<dyn ObjectStore>,
        network: Arc<N>,
        layout: LocalLayout,
        config: SessionConfig,
    ) -> Self
    where
        N: NetworkResourceProbe + NetworkMutator + 'static,
    {
        Self {
            directory,
            store,
            probe: network.clone(),
            mutator: network,
            layout,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the endpoint wait when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn layout(&self) -> &LocalLayout {
        &self.layout
    }

    fn suffix(&self) -> RegionSuffix {
        RegionSuffix::from_region(&self.config.region)
    }

    /// Narrow network -> member -> peer through `selector`
    pub async fn choose_context(&self, selector: &mut dyn Selector) -> Result<SetupContext> {
        let networks = self
            .directory
            .list_networks()
            .await
            .context("Failed to list networks")?;
        let chosen = select(selector, CandidateKind::Network, networks)?;
        let network = self
            .directory
            .network(&chosen.id)
            .await
            .with_context(|| format!("Failed to describe network {}", chosen.id))?;

        let members = self
            .directory
            .list_members(&network.id, Ownership::Owned)
            .await
            .with_context(|| format!("Failed to list members of network {}", network.id))?;
        let chosen = select(selector, CandidateKind::Member, members)?;
        let mut member = self
            .directory
            .member(&network.id, &chosen.id)
            .await
            .with_context(|| format!("Failed to describe member {}", chosen.id))?;
        member.is_owned = chosen.is_owned;

        let nodes = self
            .directory
            .list_nodes(&network.id, &member.id)
            .await
            .with_context(|| format!("Failed to list peer nodes of member {}", member.id))?;
        if nodes.is_empty() {
            bail!(
                "member {} has no available peer node; create one with \
                 'aws managedblockchain create-node --network-id {} --member-id {} \
                 --node-configuration InstanceType=bc.t3.medium,AvailabilityZone={}a' \
                 and re-run once it is up",
                member.id,
                network.id,
                member.id,
                self.config.region
            );
        }
        let chosen = select(selector, CandidateKind::Peer, nodes)?;
        let node = self
            .directory
            .node(&network.id, &member.id, &chosen.id)
            .await
            .with_context(|| format!("Failed to describe peer node {}", chosen.id))?;

        info!(
            network = %network.name,
            member = %member.name,
            peer = %node.id,
            "Selected network, member and peer"
        );
        Ok(SetupContext {
            network,
            member,
            node,
        })
    }

    /// Ensure this host can reach `network` through its VPC endpoint service
    pub async fn ensure_endpoint(&self, network: &Network) -> Result<PrivateEndpoint> {
        let service_name = network
            .vpc_endpoint_service_name
            .as_deref()
            .with_context(|| format!("network {} has no VPC endpoint service", network.id))?;

        let host = self
            .probe
            .host_placement()
            .await
            .context("Failed to determine this host's VPC placement")?;
        info!(
            instance_id = %host.instance_id,
            vpc_id = %host.vpc_id,
            subnet_id = %host.subnet_id,
            "🔍 Host placement"
        );

        let desired = DesiredEndpoint::for_host(service_name, &host);
        let endpoint = EndpointReconciler::new(self.probe.clone(), self.mutator.clone())
            .with_poll_policy(self.config.poll.clone())
            .with_ambiguity_policy(self.config.ambiguity)
            .with_cancellation(self.cancel.clone())
            .ensure(&desired)
            .await?;

        info!(endpoint_id = %endpoint.id, "✅ VPC endpoint ready");
        Ok(endpoint)
    }

    pub async fn write_exports(&self, ctx: &SetupContext) -> Result<FabricExports> {
        let exports = FabricExports::collect(
            &ctx.network,
            &ctx.member,
            &ctx.node,
            &self.config.container_home,
        );
        let path = self.layout.exports_file();
        exports
            .write(&path)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(exports)
    }

    /// Enroll the member's admin identity into `~/admin-msp`
    pub async fn enroll(&self, member: &Member, password: &str) -> Result<()> {
        let admin_user = member
            .admin_username
            .as_deref()
            .with_context(|| format!("member {} has no admin username", member.id))?;
        let ca_endpoint = member
            .ca_endpoint
            .as_deref()
            .with_context(|| format!("member {} has no CA endpoint", member.id))?;

        Enrollment::new(
            resolve_binary(self.config.ca_client.clone()),
            self.config.tls_chain.clone(),
            self.layout.admin_msp(),
        )
        .enroll(admin_user, password, ca_endpoint)
        .await?;
        Ok(())
    }

    /// Publish the local admin MSP and, when given, the peer address
    pub async fn publish(&self, ids: &Identifiers, peer_endpoint: Option<&str>) -> Result<()> {
        let bundle = CredentialBundle::load(&self.layout.admin_msp()).await?;
        let publisher = CredentialPublisher::new(self.store.clone(), self.suffix());

        publisher
            .publish(&ids.network_id, &ids.member_id, &bundle)
            .await?;
        match peer_endpoint {
            Some(peer_endpoint) => {
                publisher
                    .publish_address(&ids.network_id, &ids.member_id, peer_endpoint)
                    .await?
            }
            None => warn!(
                member_id = %ids.member_id,
                "No peer endpoint known, other members will not learn this peer's address"
            ),
        }
        Ok(())
    }

    /// The whole setup flow
    pub async fn setup(&self, selector: &mut dyn Selector, password: &str) -> Result<SetupContext> {
        let ctx = self.choose_context(selector).await?;
        let peer_endpoint = ctx.node.peer_endpoint.clone().with_context(|| {
            format!(
                "peer node {} of member {} has no peer endpoint yet",
                ctx.node.id, ctx.member.id
            )
        })?;

        info!("1️⃣  Setting up VPC endpoint");
        self.ensure_endpoint(&ctx.network).await?;

        info!("2️⃣  Creating exports file");
        self.write_exports(&ctx).await?;

        info!("3️⃣  Obtaining admin certificate");
        self.enroll(&ctx.member, password).await?;

        info!("4️⃣  Publishing public certificates");
        let ids = Identifiers {
            network_id: ctx.network.id.clone(),
            member_id: ctx.member.id.clone(),
        };
        self.publish(&ids, Some(&peer_endpoint)).await?;

        info!(
            exports = %self.layout.exports_file().display(),
            "✅ Setup complete; run 'source ~/fabric_exports' in every new shell"
        );
        Ok(ctx)
    }

    /// Pull the certificates of every other member of the network
    pub async fn copy_certs(
        &self,
        network_id: Option<String>,
        member_id: Option<String>,
    ) -> Result<FetchReport> {
        let ids = Identifiers::require(network_id, member_id)?;
        info!(
            network_id = %ids.network_id,
            member_id = %ids.member_id,
            "Copying public certificates of other members"
        );

        let fetcher = CredentialFetcher::new(
            self.store.clone(),
            self.directory.clone(),
            self.layout.clone(),
            self.suffix(),
        );
        let report = fetcher
            .fetch_all(&ids.network_id, &ids.member_id, &default_exclusion)
            .await?;
        Ok(report)
    }
}
