//! VPC Endpoint Reconciler
//!
//! Converges the interface endpoint towards the desired attachments:
//!
//! 1. Find the endpoint for the service in this VPC, or create one
//! 2. Add any missing subnet / security group (never remove)
//! 3. Ensure the peer ingress rule on the primary security group
//! 4. Poll until the endpoint is `available`
//!
//! Re-running `ensure` against a converged endpoint performs no mutations.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{
    CreateEndpointRequest, DesiredEndpoint, EndpointState, IngressRule, PrivateEndpoint,
    ProvisionError,
};
use super::{NetworkMutator, NetworkResourceProbe};

/// Error code EC2 returns when the ingress rule already exists
pub const DUPLICATE_RULE_CODE: &str = "InvalidPermission.Duplicate";

/// Polls after a create during which a missing endpoint counts as pending
///
/// EC2 may not list a freshly created endpoint by id right away.
pub const CREATE_VISIBILITY_POLLS: u32 = 5;

/// How long to wait for a pending endpoint
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Sleep between two observations
    pub interval: Duration,
    /// Maximum number of observations (0 = unbounded)
    pub max_attempts: u32,
    /// Overall wall-clock limit for the wait
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 200,
            deadline: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// What to do when several endpoints to the same service exist in the VPC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Fail with `ProvisionError::AmbiguousEndpoint`
    #[default]
    Reject,
    /// Use the first one EC2 returns
    UseFirst,
}

pub struct EndpointReconciler {
    probe: Arc<dyn NetworkResourceProbe>,
    mutator: Arc<dyn NetworkMutator>,
    poll: PollPolicy,
    ambiguity: AmbiguityPolicy,
    cancel: CancellationToken,
}

impl EndpointReconciler {
    pub fn new(probe: Arc<dyn NetworkResourceProbe>, mutator: Arc<dyn NetworkMutator>) -> Self {
        Self {
            probe,
            mutator,
            poll: PollPolicy::default(),
            ambiguity: AmbiguityPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_ambiguity_policy(mut self, ambiguity: AmbiguityPolicy) -> Self {
        self.ambiguity = ambiguity;
        self
    }

    /// Stop waiting as soon as `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Make the endpoint exist, carry the desired attachments and be available
    pub async fn ensure(&self, desired: &DesiredEndpoint) -> Result<PrivateEndpoint, ProvisionError> {
        info!(
            service_name = %desired.service_name,
            vpc_id = %desired.vpc_id,
            subnet_id = %desired.subnet_id,
            "Reconciling VPC endpoint"
        );

        let (endpoint, created) = match self.canonical_endpoint(desired).await? {
            Some(existing) => {
                info!(endpoint_id = %existing.id, state = %existing.state, "VPC endpoint already exists");
                self.attach_missing(&existing, desired).await?;
                (existing, false)
            }
            None => (self.create(desired).await?, true),
        };

        if let Some(group_id) = desired.primary_security_group() {
            self.ensure_peer_ingress(group_id).await?;
        } else {
            warn!(endpoint_id = %endpoint.id, "No security group desired, skipping peer ingress rule");
        }

        self.wait_until_available(&endpoint.id, created).await
    }

    async fn canonical_endpoint(
        &self,
        desired: &DesiredEndpoint,
    ) -> Result<Option<PrivateEndpoint>, ProvisionError> {
        let endpoints = self
            .probe
            .find_endpoints(&desired.service_name, &desired.vpc_id)
            .await
            .map_err(|e| {
                ProvisionError::unavailable(
                    format!("listing VPC endpoints for {}", desired.service_name),
                    e,
                )
            })?;

        // deleting/deleted endpoints stay listed for a while; they are not candidates
        let (mut endpoints, gone): (Vec<_>, Vec<_>) = endpoints
            .into_iter()
            .partition(|e| e.state != EndpointState::Absent);
        for endpoint in &gone {
            debug!(endpoint_id = %endpoint.id, "Ignoring VPC endpoint being deleted");
        }

        if endpoints.len() > 1 {
            let endpoint_ids: Vec<String> = endpoints.iter().map(|e| e.id.clone()).collect();
            match self.ambiguity {
                AmbiguityPolicy::Reject => {
                    return Err(ProvisionError::AmbiguousEndpoint {
                        service_name: desired.service_name.clone(),
                        endpoint_ids,
                    });
                }
                AmbiguityPolicy::UseFirst => {
                    warn!(
                        service_name = %desired.service_name,
                        endpoints = %endpoint_ids.join(", "),
                        "Several VPC endpoints match, using the first"
                    );
                }
            }
        }

        if endpoints.is_empty() {
            Ok(None)
        } else {
            Ok(Some(endpoints.swap_remove(0)))
        }
    }

    async fn create(&self, desired: &DesiredEndpoint) -> Result<PrivateEndpoint, ProvisionError> {
        let request = CreateEndpointRequest {
            service_name: desired.service_name.clone(),
            vpc_id: desired.vpc_id.clone(),
            subnet_ids: vec![desired.subnet_id.clone()],
            security_group_ids: desired.security_group_ids.clone(),
            client_token: uuid::Uuid::new_v4().to_string(),
            private_dns_enabled: true,
        };

        let endpoint = self.mutator.create_endpoint(&request).await.map_err(|e| {
            ProvisionError::unavailable(
                format!("creating VPC endpoint for {}", desired.service_name),
                e,
            )
        })?;

        info!(endpoint_id = %endpoint.id, "VPC endpoint created, waiting until it is ready");
        Ok(endpoint)
    }

    /// Additive only: attachments other consumers rely on are left in place
    async fn attach_missing(
        &self,
        endpoint: &PrivateEndpoint,
        desired: &DesiredEndpoint,
    ) -> Result<(), ProvisionError> {
        let subnets: Vec<String> = if endpoint.has_subnet(&desired.subnet_id) {
            Vec::new()
        } else {
            vec![desired.subnet_id.clone()]
        };
        let groups = endpoint.missing_security_groups(&desired.security_group_ids);

        if subnets.is_empty() && groups.is_empty() {
            return Ok(());
        }

        info!(
            endpoint_id = %endpoint.id,
            add_subnets = ?subnets,
            add_security_groups = ?groups,
            "Attaching VPC endpoint to this host"
        );

        self.mutator
            .add_attachments(&endpoint.id, &subnets, &groups)
            .await
            .map_err(|e| {
                ProvisionError::unavailable(format!("modifying VPC endpoint {}", endpoint.id), e)
            })
    }

    async fn ensure_peer_ingress(&self, group_id: &str) -> Result<(), ProvisionError> {
        let rule = IngressRule::peer_traffic(group_id);

        let existing = self.probe.ingress_rules(group_id).await.map_err(|e| {
            ProvisionError::unavailable(format!("reading ingress rules of {group_id}"), e)
        })?;

        if existing.iter().any(|r| rule.is_covered_by(r)) {
            return Ok(());
        }

        match self.mutator.authorize_ingress(group_id, &rule).await {
            Ok(()) => {
                info!(
                    group_id = %group_id,
                    from_port = rule.from_port,
                    to_port = rule.to_port,
                    "Authorized peer ingress"
                );
                Ok(())
            }
            Err(e) if e.has_code(DUPLICATE_RULE_CODE) => {
                info!(group_id = %group_id, "Peer ingress rule already present");
                Ok(())
            }
            Err(e) => Err(ProvisionError::unavailable(
                format!("authorizing peer ingress on {group_id}"),
                e,
            )),
        }
    }

    /// `just_created` tolerates the endpoint not being visible yet for a few polls
    async fn wait_until_available(
        &self,
        endpoint_id: &str,
        just_created: bool,
    ) -> Result<PrivateEndpoint, ProvisionError> {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_state = EndpointState::Pending;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled {
                    endpoint_id: endpoint_id.to_string(),
                    last_state,
                });
            }

            attempts += 1;
            let observed = self.probe.endpoint(endpoint_id).await.map_err(|e| {
                ProvisionError::unavailable(format!("polling VPC endpoint {endpoint_id}"), e)
            })?;

            match observed {
                Some(endpoint) => {
                    last_state = endpoint.state;
                    match endpoint.state {
                        EndpointState::Available => {
                            info!(endpoint_id = %endpoint_id, attempts, "VPC endpoint is available");
                            return Ok(endpoint);
                        }
                        EndpointState::Pending => {}
                        state => {
                            return Err(ProvisionError::EndpointFailed {
                                endpoint_id: endpoint_id.to_string(),
                                state,
                            })
                        }
                    }
                }
                None if just_created && attempts <= CREATE_VISIBILITY_POLLS => {
                    debug!(endpoint_id = %endpoint_id, attempts, "New VPC endpoint not visible yet");
                }
                None => {
                    return Err(ProvisionError::EndpointFailed {
                        endpoint_id: endpoint_id.to_string(),
                        state: EndpointState::Absent,
                    })
                }
            }

            let out_of_attempts = self.poll.max_attempts > 0 && attempts >= self.poll.max_attempts;
            let past_deadline = self
                .poll
                .deadline
                .map(|d| started.elapsed() >= d)
                .unwrap_or(false);
            if out_of_attempts || past_deadline {
                return Err(ProvisionError::TimedOut {
                    endpoint_id: endpoint_id.to_string(),
                    last_state,
                    attempts,
                });
            }

            info!(endpoint_id = %endpoint_id, state = %last_state, "VPC endpoint not ready, waiting");

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(ProvisionError::Cancelled {
                        endpoint_id: endpoint_id.to_string(),
                        last_state,
                    });
                }
                _ = tokio::time::sleep(self.poll.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::CloudError;
    use crate::network::HostPlacement;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::Mutex;

    /// Scriptable EC2 stand-in that records every mutation
    #[derive(Default)]
    struct FakeNetwork {
        endpoints: Mutex<Vec<PrivateEndpoint>>,
        /// States reported by successive polls; the last one sticks
        poll_script: Mutex<VecDeque<EndpointState>>,
        rules: Mutex<Vec<IngressRule>>,
        mutations: Mutex<Vec<String>>,
        polls: Mutex<u32>,
        reject_rule_as_duplicate: bool,
        /// Polls for which a newly created endpoint is not found by id
        hidden_after_create: Mutex<u32>,
    }

    impl FakeNetwork {
        fn with_endpoint(self, subnets: &[&str], groups: &[&str], state: EndpointState) -> Self {
            let id = format!("vpce-{}", self.endpoints.lock().unwrap().len() + 1);
            self.endpoints.lock().unwrap().push(PrivateEndpoint {
                id,
                service_name: "svc".to_string(),
                vpc_id: "vpc-1".to_string(),
                subnet_ids: subnets.iter().map(|s| s.to_string()).collect(),
                security_group_ids: groups.iter().map(|s| s.to_string()).collect(),
                state,
            });
            self
        }

        fn with_polls(self, states: &[EndpointState]) -> Self {
            self.poll_script.lock().unwrap().extend(states.iter().copied());
            self
        }

        fn with_rule(self, rule: IngressRule) -> Self {
            self.rules.lock().unwrap().push(rule);
            self
        }

        fn mutations(&self) -> Vec<String> {
            self.mutations.lock().unwrap().clone()
        }

        fn polls(&self) -> u32 {
            *self.polls.lock().unwrap()
        }

        fn subnets_of(&self, id: &str) -> BTreeSet<String> {
            self.endpoints
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.id == id)
                .map(|e| e.subnet_ids.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl NetworkResourceProbe for FakeNetwork {
        async fn host_placement(&self) -> Result<HostPlacement, CloudError> {
            Ok(HostPlacement {
                instance_id: "i-1".to_string(),
                vpc_id: "vpc-1".to_string(),
                subnet_id: "subnet-a".to_string(),
                security_group_ids: vec!["sg-1".to_string()],
            })
        }

        async fn find_endpoints(
            &self,
            service_name: &str,
            vpc_id: &str,
        ) -> Result<Vec<PrivateEndpoint>, CloudError> {
            Ok(self
                .endpoints
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.service_name == service_name && e.vpc_id == vpc_id)
                .cloned()
                .collect())
        }

        async fn endpoint(&self, endpoint_id: &str) -> Result<Option<PrivateEndpoint>, CloudError> {
            *self.polls.lock().unwrap() += 1;

            {
                let mut hidden = self.hidden_after_create.lock().unwrap();
                if endpoint_id == "vpce-new" && *hidden > 0 {
                    *hidden -= 1;
                    return Ok(None);
                }
            }

            let mut script = self.poll_script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().copied()
            };

            let mut endpoints = self.endpoints.lock().unwrap();
            let Some(endpoint) = endpoints.iter_mut().find(|e| e.id == endpoint_id) else {
                return Ok(None);
            };
            if let Some(state) = next {
                endpoint.state = state;
            }
            Ok(Some(endpoint.clone()))
        }

        async fn ingress_rules(&self, _group_id: &str) -> Result<Vec<IngressRule>, CloudError> {
            Ok(self.rules.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl NetworkMutator for FakeNetwork {
        async fn create_endpoint(
            &self,
            request: &CreateEndpointRequest,
        ) -> Result<PrivateEndpoint, CloudError> {
            self.mutations.lock().unwrap().push("create".to_string());
            let endpoint = PrivateEndpoint {
                id: "vpce-new".to_string(),
                service_name: request.service_name.clone(),
                vpc_id: request.vpc_id.clone(),
                subnet_ids: request.subnet_ids.iter().cloned().collect(),
                security_group_ids: request.security_group_ids.iter().cloned().collect(),
                state: EndpointState::Pending,
            };
            self.endpoints.lock().unwrap().push(endpoint.clone());
            Ok(endpoint)
        }

        async fn add_attachments(
            &self,
            endpoint_id: &str,
            subnet_ids: &[String],
            security_group_ids: &[String],
        ) -> Result<(), CloudError> {
            self.mutations
                .lock()
                .unwrap()
                .push(format!("attach {subnet_ids:?} {security_group_ids:?}"));
            let mut endpoints = self.endpoints.lock().unwrap();
            if let Some(endpoint) = endpoints.iter_mut().find(|e| e.id == endpoint_id) {
                endpoint.subnet_ids.extend(subnet_ids.iter().cloned());
                endpoint.security_group_ids.extend(security_group_ids.iter().cloned());
            }
            Ok(())
        }

        async fn authorize_ingress(
            &self,
            group_id: &str,
            rule: &IngressRule,
        ) -> Result<(), CloudError> {
            if self.reject_rule_as_duplicate {
                return Err(CloudError::with_code(
                    "ec2 authorize-security-group-ingress",
                    DUPLICATE_RULE_CODE,
                    "the specified rule already exists",
                ));
            }
            self.mutations.lock().unwrap().push(format!("authorize {group_id}"));
            self.rules.lock().unwrap().push(rule.clone());
            Ok(())
        }
    }

    fn desired() -> DesiredEndpoint {
        DesiredEndpoint {
            service_name: "svc".to_string(),
            vpc_id: "vpc-1".to_string(),
            subnet_id: "subnet-a".to_string(),
            security_group_ids: vec!["sg-1".to_string()],
        }
    }

    fn reconciler(network: &Arc<FakeNetwork>) -> EndpointReconciler {
        EndpointReconciler::new(network.clone(), network.clone())
            .with_poll_policy(PollPolicy::new(Duration::ZERO, 50))
    }

    #[tokio::test]
    async fn test_creates_missing_endpoint() {
        let network = Arc::new(FakeNetwork::default().with_polls(&[
            EndpointState::Pending,
            EndpointState::Available,
        ]));

        let endpoint = reconciler(&network).ensure(&desired()).await.unwrap();

        assert_eq!(endpoint.id, "vpce-new");
        assert_eq!(endpoint.state, EndpointState::Available);
        assert_eq!(
            network.mutations(),
            vec!["create".to_string(), "authorize sg-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_new_endpoint_not_yet_listed_is_waited_for() {
        let network = Arc::new(FakeNetwork {
            hidden_after_create: Mutex::new(2),
            ..FakeNetwork::default()
        }
        .with_polls(&[EndpointState::Available]));

        let endpoint = reconciler(&network).ensure(&desired()).await.unwrap();

        assert_eq!(endpoint.id, "vpce-new");
        assert_eq!(endpoint.state, EndpointState::Available);
        assert_eq!(network.polls(), 3);
    }

    #[tokio::test]
    async fn test_new_endpoint_that_never_appears_is_absent() {
        let network = Arc::new(FakeNetwork {
            hidden_after_create: Mutex::new(u32::MAX),
            ..FakeNetwork::default()
        });

        let err = reconciler(&network).ensure(&desired()).await.unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::EndpointFailed { state: EndpointState::Absent, .. }
        ));
        assert_eq!(network.polls(), CREATE_VISIBILITY_POLLS + 1);
    }

    #[tokio::test]
    async fn test_existing_endpoint_disappearing_is_terminal() {
        let network = Arc::new(FakeNetwork::default());

        let err = reconciler(&network)
            .wait_until_available("vpce-1", false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::EndpointFailed { state: EndpointState::Absent, .. }
        ));
        assert_eq!(network.polls(), 1);
    }

    #[tokio::test]
    async fn test_deleted_endpoint_is_replaced() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Absent)
                .with_rule(IngressRule::peer_traffic("sg-1"))
                .with_polls(&[EndpointState::Available]),
        );

        let endpoint = reconciler(&network).ensure(&desired()).await.unwrap();

        assert_eq!(endpoint.id, "vpce-new");
        assert_eq!(endpoint.state, EndpointState::Available);
        assert_eq!(network.mutations(), vec!["create".to_string()]);
    }

    #[tokio::test]
    async fn test_deleted_endpoint_does_not_make_lookup_ambiguous() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Absent)
                .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Available)
                .with_rule(IngressRule::peer_traffic("sg-1")),
        );

        let endpoint = reconciler(&network).ensure(&desired()).await.unwrap();

        assert_eq!(endpoint.id, "vpce-2");
        assert!(network.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_second_ensure_is_a_no_op() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-z"], &["sg-9"], EndpointState::Available),
        );
        let reconciler = reconciler(&network);

        let first = reconciler.ensure(&desired()).await.unwrap();
        let mutations_after_first = network.mutations().len();
        assert_eq!(mutations_after_first, 2);

        let second = reconciler.ensure(&desired()).await.unwrap();

        assert_eq!(network.mutations().len(), mutations_after_first);
        assert_eq!(first, second);
        assert_eq!(second.state, EndpointState::Available);
    }

    #[tokio::test]
    async fn test_attachments_are_only_added() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-a", "subnet-x"], &["sg-1", "sg-7"], EndpointState::Available)
                .with_rule(IngressRule::peer_traffic("sg-1")),
        );

        // desired is a strict subset of what is attached
        let endpoint = reconciler(&network).ensure(&desired()).await.unwrap();

        assert!(network.mutations().is_empty());
        assert!(endpoint.subnet_ids.contains("subnet-x"));
        assert!(endpoint.security_group_ids.contains("sg-7"));
        assert_eq!(network.subnets_of("vpce-1").len(), 2);
    }

    #[tokio::test]
    async fn test_missing_subnet_is_attached_incrementally() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-x"], &["sg-1"], EndpointState::Available)
                .with_rule(IngressRule::peer_traffic("sg-1")),
        );

        reconciler(&network).ensure(&desired()).await.unwrap();

        assert_eq!(network.mutations(), vec![r#"attach ["subnet-a"] []"#.to_string()]);
        let subnets = network.subnets_of("vpce-1");
        assert!(subnets.contains("subnet-a") && subnets.contains("subnet-x"));
    }

    #[tokio::test]
    async fn test_converges_after_exactly_n_polls() {
        const N: usize = 4;
        let mut script = vec![EndpointState::Pending; N - 1];
        script.push(EndpointState::Available);

        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Pending)
                .with_rule(IngressRule::peer_traffic("sg-1"))
                .with_polls(&script),
        );

        let endpoint = reconciler(&network).ensure(&desired()).await.unwrap();

        assert_eq!(endpoint.state, EndpointState::Available);
        assert_eq!(network.polls(), N as u32);
    }

    #[tokio::test]
    async fn test_failed_state_is_terminal_on_first_poll() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Pending)
                .with_rule(IngressRule::peer_traffic("sg-1"))
                .with_polls(&[EndpointState::Failed]),
        );

        let err = reconciler(&network).ensure(&desired()).await.unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::EndpointFailed { ref endpoint_id, state: EndpointState::Failed }
                if endpoint_id == "vpce-1"
        ));
        assert_eq!(network.polls(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_endpoints_are_reported() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Available)
                .with_endpoint(&["subnet-b"], &["sg-1"], EndpointState::Available)
                .with_rule(IngressRule::peer_traffic("sg-1")),
        );

        let err = reconciler(&network).ensure(&desired()).await.unwrap_err();
        match err {
            ProvisionError::AmbiguousEndpoint { endpoint_ids, .. } => {
                assert_eq!(endpoint_ids, vec!["vpce-1".to_string(), "vpce-2".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(network.mutations().is_empty());

        let endpoint = reconciler(&network)
            .with_ambiguity_policy(AmbiguityPolicy::UseFirst)
            .ensure(&desired())
            .await
            .unwrap();
        assert_eq!(endpoint.id, "vpce-1");
    }

    #[tokio::test]
    async fn test_duplicate_rule_is_not_an_error() {
        let network = Arc::new(FakeNetwork {
            reject_rule_as_duplicate: true,
            ..FakeNetwork::default()
        }
        .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Available));

        let endpoint = reconciler(&network).ensure(&desired()).await.unwrap();
        assert_eq!(endpoint.state, EndpointState::Available);
    }

    #[tokio::test]
    async fn test_poll_budget_is_bounded() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Pending)
                .with_rule(IngressRule::peer_traffic("sg-1")),
        );

        let err = EndpointReconciler::new(network.clone(), network.clone())
            .with_poll_policy(PollPolicy::new(Duration::ZERO, 3))
            .ensure(&desired())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::TimedOut { attempts: 3, last_state: EndpointState::Pending, .. }
        ));
        assert_eq!(network.polls(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_wait() {
        let network = Arc::new(
            FakeNetwork::default()
                .with_endpoint(&["subnet-a"], &["sg-1"], EndpointState::Pending)
                .with_rule(IngressRule::peer_traffic("sg-1")),
        );
        let cancel = CancellationToken::new();

        let reconciler = EndpointReconciler::new(network.clone(), network.clone())
            .with_poll_policy(PollPolicy::new(Duration::from_secs(3600), 0))
            .with_cancellation(cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = reconciler.ensure(&desired()).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, ProvisionError::Cancelled { .. }));
        assert_eq!(network.polls(), 1);
    }
}
