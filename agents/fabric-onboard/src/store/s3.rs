//! S3-backed object store
//!
//! Object bodies are staged through temporary files because `s3api`
//! reads and writes bodies from paths.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{ObjectStore, StoreError};
use crate::aws::{AwsCli, CloudError};

/// Error codes S3 uses for a key that does not exist.
///
/// `AccessDenied` is not one of them: a permission problem must surface.
const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "404", "NotFound"];

#[derive(Debug, Deserialize)]
struct ListObjectsOutput {
    #[serde(rename = "Contents", default)]
    contents: Option<Vec<ListedObject>>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    #[serde(rename = "Key")]
    key: String,
}

/// Object store on an S3 bucket
pub struct S3ObjectStore {
    cli: AwsCli,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(cli: AwsCli, bucket: impl Into<String>) -> Self {
        Self {
            cli,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn unavailable(key: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

fn classify(key: &str, err: CloudError) -> StoreError {
    if err.has_any_code(NOT_FOUND_CODES) {
        StoreError::NotFound {
            key: key.to_string(),
        }
    } else {
        unavailable(key, err)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    async fn put(&self, key: &str, bytes: &[u8], public: bool) -> Result<(), StoreError> {
        let staged = tempfile::NamedTempFile::new().map_err(|e| unavailable(key, e))?;
        tokio::fs::write(staged.path(), bytes)
            .await
            .map_err(|e| unavailable(key, e))?;

        let body = staged.path().to_string_lossy().to_string();
        let mut args = vec![
            "--bucket",
            self.bucket.as_str(),
            "--key",
            key,
            "--body",
            body.as_str(),
        ];
        if public {
            args.extend(["--acl", "public-read"]);
        }

        self.cli
            .call("s3api", "put-object", &args)
            .await
            .map_err(|e| unavailable(key, e))?;

        info!(location = %self.location(key), bytes = bytes.len(), public, "Object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let staged = tempfile::NamedTempFile::new().map_err(|e| unavailable(key, e))?;
        let outfile = staged.path().to_string_lossy().to_string();

        self.cli
            .call(
                "s3api",
                "get-object",
                &["--bucket", self.bucket.as_str(), "--key", key, outfile.as_str()],
            )
            .await
            .map_err(|e| classify(key, e))?;

        let bytes = tokio::fs::read(staged.path())
            .await
            .map_err(|e| unavailable(key, e))?;

        debug!(location = %self.location(key), bytes = bytes.len(), "Object read");
        Ok(bytes)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let output: ListObjectsOutput = self
            .cli
            .call_json(
                "s3api",
                "list-objects-v2",
                &["--bucket", self.bucket.as_str(), "--prefix", prefix],
            )
            .await
            .map_err(|e| unavailable(prefix, e))?;

        let mut keys: Vec<String> = output
            .contents
            .unwrap_or_default()
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.sort();
        Ok(keys)
    }
}
