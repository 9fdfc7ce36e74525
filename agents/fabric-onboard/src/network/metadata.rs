//! EC2 Instance Metadata
//!
//! Resolves the id of the instance this process runs on. Tries an IMDSv2
//! session token first and falls back to IMDSv1 when the token call fails.

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::aws::CloudError;

const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const TOKEN_TTL_SECONDS: &str = "21600";
const OPERATION: &str = "imds instance-id";

pub struct InstanceMetadata {
    client: Client,
    endpoint: String,
}

impl InstanceMetadata {
    pub fn new() -> Result<Self, CloudError> {
        Self::with_endpoint(IMDS_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| CloudError::local(OPERATION, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn session_token(&self) -> Option<String> {
        let url = format!("{}/latest/api/token", self.endpoint);
        let response = self
            .client
            .put(&url)
            .header("X-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECONDS)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "IMDSv2 token unavailable, using IMDSv1");
            return None;
        }
        response.text().await.ok()
    }

    pub async fn instance_id(&self) -> Result<String, CloudError> {
        let url = format!("{}/latest/meta-data/instance-id", self.endpoint);

        let mut request = self.client.get(&url);
        if let Some(token) = self.session_token().await {
            request = request.header("X-aws-ec2-metadata-token", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CloudError::local(OPERATION, format!("metadata service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(CloudError::local(
                OPERATION,
                format!("metadata service returned {}", response.status()),
            ));
        }

        let instance_id = response
            .text()
            .await
            .map_err(|e| CloudError::local(OPERATION, e.to_string()))?
            .trim()
            .to_string();

        if instance_id.is_empty() {
            return Err(CloudError::local(OPERATION, "empty instance id"));
        }

        debug!(instance_id = %instance_id, "Resolved instance id");
        Ok(instance_id)
    }
}
