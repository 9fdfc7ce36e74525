//! Public credential exchange over the shared object store

mod fetcher;
mod keys;
mod publisher;
mod trust_store;
mod types;

pub use fetcher::{default_exclusion, CredentialFetcher, PLACEHOLDER_MEMBER_NAME};
pub use keys::{CredentialKeys, RegionSuffix};
pub use publisher::CredentialPublisher;
pub use trust_store::TrustStore;
pub use types::*;
