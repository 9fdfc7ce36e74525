//! AWS CLI Runner
//!
//! Control-plane calls (EC2, S3, Managed Blockchain) go through the `aws` CLI
//! with `--output json`. Credential and region resolution stay with the CLI's
//! own provider chain, the same way the GCP agents lean on `gcloud` for ADC.

use serde::de::DeserializeOwned;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A failed AWS call.
///
/// `code` is the service error code the CLI prints as
/// `An error occurred (<code>) when calling the <Operation> operation: ...`.
/// Call sites match on the code, never on the free-form message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed{}: {message}", code_suffix(.code))]
pub struct CloudError {
    pub operation: String,
    pub code: Option<String>,
    pub message: String,
}

impl CloudError {
    /// Build an error from the CLI's stderr output
    pub fn from_stderr(operation: &str, stderr: &str) -> Self {
        Self {
            operation: operation.to_string(),
            code: parse_error_code(stderr),
            message: stderr.trim().to_string(),
        }
    }

    /// Error raised before the service answered (spawn failure, bad JSON, ...)
    pub fn local(operation: &str, message: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            code: None,
            message: message.into(),
        }
    }

    /// Error carrying a known service code
    pub fn with_code(operation: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    pub fn has_any_code(&self, codes: &[&str]) -> bool {
        codes.iter().any(|c| self.has_code(c))
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Extract `<code>` from `An error occurred (<code>) when calling ...`
pub fn parse_error_code(stderr: &str) -> Option<String> {
    const MARKER: &str = "An error occurred (";

    let start = stderr.find(MARKER)? + MARKER.len();
    let end = stderr[start..].find(')')? + start;
    let code = stderr[start..end].trim();

    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

/// `aws` CLI invoker
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self {
            program: "aws".to_string(),
            region,
            profile,
        }
    }

    /// Use a different executable (e.g. a pinned `aws` v2 install)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Run `aws <service> <operation> <args..>` and return raw stdout
    pub async fn call(
        &self,
        service: &str,
        operation: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, CloudError> {
        let label = format!("{service} {operation}");
        debug!(service = %service, operation = %operation, "Running aws CLI");

        let mut command = Command::new(&self.program);
        command.args(["--output", "json"]);
        if let Some(region) = &self.region {
            command.args(["--region", region.as_str()]);
        }
        if let Some(profile) = &self.profile {
            command.args(["--profile", profile.as_str()]);
        }
        command
            .arg(service)
            .arg(operation)
            .args(args)
            .stdin(Stdio::null());

        let output = command
            .output()
            .await
            .map_err(|e| CloudError::local(&label, format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudError::from_stderr(&label, &stderr));
        }

        Ok(output.stdout)
    }

    /// Run a call and deserialize its JSON output
    ///
    /// Some operations print nothing on an empty result; that is read as `{}`.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        args: &[&str],
    ) -> Result<T, CloudError> {
        let stdout = self.call(service, operation, args).await?;
        parse_json_output(&format!("{service} {operation}"), &stdout)
    }
}

fn parse_json_output<T: DeserializeOwned>(label: &str, stdout: &[u8]) -> Result<T, CloudError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    let body = if text.is_empty() { "{}" } else { text };

    serde_json::from_str(body)
        .map_err(|e| CloudError::local(label, format!("unexpected CLI output: {e}")))
}
