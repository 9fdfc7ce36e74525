//! Fabric Onboarding Library
//!
//! Onboards this machine into a managed Hyperledger Fabric network:
//! private connectivity through an interface VPC endpoint, an enrolled admin
//! identity, and an exchange of public certificates with the other members
//! through a shared S3 bucket.

pub mod aws;
pub mod credentials;
pub mod directory;
pub mod enroll;
pub mod exports;
pub mod layout;
pub mod model;
pub mod network;
pub mod select;
pub mod session;
pub mod store;

pub use aws::{AwsCli, CloudError};
pub use credentials::{
    CredentialBundle, CredentialFetcher, CredentialPublisher, FetchError, FetchReport,
    FetchStatus, PublishError, RegionSuffix,
};
pub use directory::{ManagedBlockchainDirectory, MemberDirectory, StaticDirectory};
pub use layout::LocalLayout;
pub use network::{EndpointReconciler, NetworkMutator, NetworkResourceProbe, ProvisionError};
pub use session::{Identifiers, OnboardingSession, PreconditionError, SessionConfig};
pub use store::{MemoryObjectStore, ObjectStore, S3ObjectStore, StoreError};
