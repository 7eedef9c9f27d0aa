//! Command handlers against a file store in a temporary directory.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]

use peerkeep::commands::{cluster_spec, reconcile, show};
use peerkeep::peerkeep_core::PeerkeepConfig;
use peerkeep::peerkeep_store::OperationResult;
use tokio_util::sync::CancellationToken;

fn config(dir: &tempfile::TempDir) -> PeerkeepConfig {
    PeerkeepConfig {
        store_dir: dir.path().join("store"),
        ..PeerkeepConfig::default()
    }
}

#[tokio::test]
async fn reconcile_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let cancel = CancellationToken::new();

    let spec = cluster_spec(&config, "demo".to_string(), None, None, 3);
    let outcome = reconcile(&config, &spec, &cancel).await.unwrap();
    assert_eq!(outcome.identities, OperationResult::Created);
    assert_eq!(outcome.added, vec![0, 1, 2]);

    let report = show(&config, &config.default_namespace, "demo", &cancel)
        .await
        .unwrap();
    assert_eq!(report.allocated, 3);
    assert!(report.cluster_secret);
    assert!(report.bootstrap_key);
    assert_eq!(report.owner.as_deref(), Some("IpfsCluster/demo"));
    assert!(report.peers.iter().all(|p| p.valid));
    assert!(report.peers.iter().all(|p| p.peer_id.starts_with("12D3KooW")));
}

#[tokio::test]
async fn identities_survive_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let cancel = CancellationToken::new();

    let small = cluster_spec(&config, "demo".to_string(), None, None, 2);
    reconcile(&config, &small, &cancel).await.unwrap();
    let before = show(&config, &config.default_namespace, "demo", &cancel)
        .await
        .unwrap();

    let large = cluster_spec(&config, "demo".to_string(), None, None, 4);
    let outcome = reconcile(&config, &large, &cancel).await.unwrap();
    assert_eq!(outcome.added, vec![2, 3]);

    let after = show(&config, &config.default_namespace, "demo", &cancel)
        .await
        .unwrap();
    assert_eq!(after.peers[..2], before.peers[..]);

    let again = reconcile(&config, &large, &cancel).await.unwrap();
    assert!(again.converged());
}

#[tokio::test]
async fn show_json_never_contains_private_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let cancel = CancellationToken::new();

    let spec = cluster_spec(&config, "demo".to_string(), None, None, 1);
    reconcile(&config, &spec, &cancel).await.unwrap();

    let report = show(&config, &config.default_namespace, "demo", &cancel)
        .await
        .unwrap();
    let json = serde_json::to_string(&report).unwrap();
    // Protobuf-framed Ed25519 private keys always start with this base64 prefix.
    assert!(!json.contains("CAESQ"));
    assert!(!json.contains("privateKey"));
}

#[tokio::test]
async fn show_missing_cluster_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let err = show(&config, "default", "absent", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ipfs-cluster-absent"));
}

#[tokio::test]
async fn reconcile_refuses_replicas_over_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let config = PeerkeepConfig {
        max_replicas: 4,
        ..config(&dir)
    };
    let cancel = CancellationToken::new();

    let spec = cluster_spec(&config, "demo".to_string(), None, None, 5);
    let err = reconcile(&config, &spec, &cancel).await.unwrap_err();
    assert!(format!("{err:#}").contains("max_replicas"));
    assert!(!dir.path().join("store").exists());
}
