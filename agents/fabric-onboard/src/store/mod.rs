//! Shared Object Store
//!
//! The rendezvous channel between members: a blob store with path-like keys.
//! Every member writes under its own `{networkId}/{memberId}/` namespace and
//! reads everybody else's.

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use thiserror::Error;

/// Object store failures
///
/// `NotFound` is expected wherever optional material is probed for;
/// `Unavailable` is transient and must reach the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("object store unavailable ({key}): {reason}")]
    Unavailable { key: String, reason: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location of a key, for logs
    fn location(&self, key: &str) -> String;

    /// Write `bytes` at `key`, replacing any previous object
    ///
    /// A reader never observes a partially written object.
    async fn put(&self, key: &str, bytes: &[u8], public: bool) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// All keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
