//! Certificate exchange between members through a shared object store

use std::sync::Arc;

use fabric_onboard::credentials::{
    default_exclusion, CaCertificate, CredentialBundle, CredentialFetcher, CredentialKeys,
    CredentialPublisher, FetchError, FetchStatus, RegionSuffix,
};
use fabric_onboard::model::{Member, Network};
use fabric_onboard::{LocalLayout, MemoryObjectStore, ObjectStore, StaticDirectory};

const NETWORK: &str = "n-WORKSHOP";

fn bundle(member_id: &str) -> CredentialBundle {
    CredentialBundle::new(
        format!("ADMIN-{member_id}").into_bytes(),
        vec![CaCertificate {
            file_name: format!("ca-{member_id}.pem"),
            bytes: format!("CA-{member_id}").into_bytes(),
        }],
    )
}

/// The directory as seen from the account owning `self_id`
fn directory(self_id: &str, members: &[(&str, &str)]) -> Arc<StaticDirectory> {
    let mut directory = StaticDirectory::new().with_network(Network::new(NETWORK, "Workshop"));
    for (id, name) in members {
        directory = directory.with_member(Member::new(NETWORK, *id, *name, *id == self_id));
    }
    Arc::new(directory)
}

async fn publish(store: &Arc<MemoryObjectStore>, member_id: &str) {
    let publisher = CredentialPublisher::new(store.clone(), RegionSuffix::default());
    publisher
        .publish(NETWORK, member_id, &bundle(member_id))
        .await
        .unwrap();
    publisher
        .publish_address(NETWORK, member_id, &format!("nd.{member_id}:30003"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_published_bundle_lands_in_peer_trust_store() {
    let store = Arc::new(MemoryObjectStore::new());
    publish(&store, "m-A").await;

    let home = tempfile::tempdir().unwrap();
    let fetcher = CredentialFetcher::new(
        store.clone(),
        directory("m-B", &[("m-A", "BankA"), ("m-B", "BankB")]),
        LocalLayout::new(home.path()),
        RegionSuffix::default(),
    );

    let report = fetcher.fetch_all(NETWORK, "m-B", &default_exclusion).await.unwrap();

    assert_eq!(report.status(), FetchStatus::Complete);
    assert_eq!(report.candidates, 1);
    let fetched = &report.fetched[0];
    assert_eq!(fetched.member_id, "m-A");
    assert_eq!(fetched.admin_cert, b"ADMIN-m-A");
    assert_eq!(fetched.ca_cert, b"CA-m-A");
    assert_eq!(fetched.peer_address.as_deref(), Some("nd.m-A:30003"));

    let msp = home.path().join("m-A-msp");
    assert_eq!(std::fs::read(msp.join("admincerts/cert.pem")).unwrap(), b"ADMIN-m-A");
    assert_eq!(std::fs::read(msp.join("cacerts/cacert.pem")).unwrap(), b"CA-m-A");
    assert_eq!(
        std::fs::read_to_string(home.path().join("environment/peer-address-m-A.txt")).unwrap(),
        "nd.m-A:30003"
    );
}

#[tokio::test]
async fn test_own_material_is_never_fetched() {
    let store = Arc::new(MemoryObjectStore::new());
    publish(&store, "m-A").await;

    let home = tempfile::tempdir().unwrap();
    // even if the directory reports self as not owned, the id check skips it
    let directory = Arc::new(
        StaticDirectory::new()
            .with_network(Network::new(NETWORK, "Workshop"))
            .with_member(Member::new(NETWORK, "m-A", "BankA", false)),
    );
    let fetcher = CredentialFetcher::new(
        store,
        directory,
        LocalLayout::new(home.path()),
        RegionSuffix::default(),
    );

    let report = fetcher.fetch_all(NETWORK, "m-A", &default_exclusion).await.unwrap();

    assert_eq!(report.status(), FetchStatus::NoCandidates);
    assert!(!home.path().join("m-A-msp").exists());
}

#[tokio::test]
async fn test_unpublished_member_does_not_block_others() {
    let store = Arc::new(MemoryObjectStore::new());
    publish(&store, "m-A").await;
    publish(&store, "m-C").await;

    let home = tempfile::tempdir().unwrap();
    let fetcher = CredentialFetcher::new(
        store,
        directory(
            "m-SELF",
            &[("m-A", "BankA"), ("m-B", "BankB"), ("m-C", "BankC"), ("m-SELF", "Me")],
        ),
        LocalLayout::new(home.path()),
        RegionSuffix::default(),
    );

    let report = fetcher.fetch_all(NETWORK, "m-SELF", &default_exclusion).await.unwrap();

    assert_eq!(report.status(), FetchStatus::Partial);
    assert_eq!(report.candidates, 3);
    let fetched: Vec<&str> = report.fetched.iter().map(|m| m.member_id.as_str()).collect();
    assert_eq!(fetched, vec!["m-A", "m-C"]);

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.member_id, "m-B");
    assert!(matches!(
        &failure.error,
        FetchError::PerMemberMissing { key, .. } if key.ends_with("admincerts/cert.pem")
    ));
    assert!(!home.path().join("m-B-msp").exists());
}

#[tokio::test]
async fn test_nothing_published_is_distinct_from_no_candidates() {
    let home = tempfile::tempdir().unwrap();
    let fetcher = CredentialFetcher::new(
        Arc::new(MemoryObjectStore::new()),
        directory("m-SELF", &[("m-A", "BankA"), ("m-SELF", "Me")]),
        LocalLayout::new(home.path()),
        RegionSuffix::default(),
    );

    let report = fetcher.fetch_all(NETWORK, "m-SELF", &default_exclusion).await.unwrap();

    assert_eq!(report.status(), FetchStatus::NothingPublished);
    assert_eq!(report.failures.len(), 1);
}

#[tokio::test]
async fn test_republishing_writes_the_same_keys() {
    let store = Arc::new(MemoryObjectStore::new());
    publish(&store, "m-A").await;
    let first = store.keys();

    publish(&store, "m-A").await;

    assert_eq!(store.keys(), first);
    assert_eq!(store.write_count(), 6);

    let keys = CredentialKeys::new(NETWORK, "m-A", &RegionSuffix::default());
    let mut expected = vec![keys.admin_cert(), keys.ca_cert(), keys.peer_address()];
    expected.sort();
    assert_eq!(first, expected);
    assert_eq!(
        store.list(&keys.prefix()).await.unwrap().len(),
        3,
        "everything lives under the member's namespace"
    );
}
