//! CLI command handlers.
//!
//! Handlers return plain values; [`execute_command`] prints them. Private
//! keys are only ever printed by `keygen --reveal`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use peerkeep_core::{ObjectKey, PeerkeepConfig};
use peerkeep_identity::{BootstrapMaterial, Ed25519Generator, IdentityGenerator, PeerIdentity};
use peerkeep_reconciler::{ClusterSpec, Controller, IdentityStore, ReconcileOutcome, RetryPolicy};
use peerkeep_store::{FileStore, Kind, Store, TracingStore, get_cancellable};
use rand::rngs::OsRng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{Cli, Commands};

/// Load the configuration the way the CLI does: file (if any), then
/// `PEERKEEP_*` environment overrides, then command line flags.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result is invalid.
pub fn load_config(cli: &Cli) -> Result<PeerkeepConfig> {
    let mut config = cli
        .config
        .as_deref()
        .map(PeerkeepConfig::from_file)
        .transpose()
        .context("Failed to load configuration")?
        .unwrap_or_default()
        .with_env_overrides();
    if let Some(dir) = &cli.store_dir {
        config.store_dir.clone_from(dir);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Execute a CLI command.
///
/// This is the main command dispatcher that routes to the appropriate handler.
///
/// # Errors
///
/// Returns the handler's error.
pub async fn execute_command(
    command: Commands,
    config: &PeerkeepConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Commands::Reconcile {
            name,
            namespace,
            replicas,
            uid,
        } => {
            let spec = cluster_spec(config, name, namespace, uid, replicas);
            let outcome = reconcile(config, &spec, cancel).await?;
            print_outcome(&outcome);
            Ok(())
        }

        Commands::Show {
            name,
            namespace,
            json,
        } => {
            let namespace = namespace.unwrap_or_else(|| config.default_namespace.clone());
            let report = show(config, &namespace, &name, cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }

        Commands::Keygen { reveal } => {
            let identity = keygen()?;
            println!("{}", identity.peer_id);
            if reveal {
                println!("{}", identity.private_key.to_base64().as_str());
            }
            Ok(())
        }
    }
}

/// Build the desired state of a cluster from CLI arguments.
pub fn cluster_spec(
    config: &PeerkeepConfig,
    name: String,
    namespace: Option<String>,
    uid: Option<String>,
    replicas: u32,
) -> ClusterSpec {
    let namespace = namespace.unwrap_or_else(|| config.default_namespace.clone());
    let uid = uid.unwrap_or_else(|| format!("{namespace}/{name}"));
    ClusterSpec::new(namespace, name, uid, replicas)
}

async fn open_store(config: &PeerkeepConfig) -> Result<Arc<dyn Store>> {
    let store = FileStore::open(&config.store_dir)
        .await
        .with_context(|| format!("Failed to open store at {}", config.store_dir.display()))?;
    Ok(Arc::new(TracingStore::new(store)))
}

/// Reconcile one cluster against the configured file store.
///
/// Fresh bootstrap material is generated for every run; it is only stored
/// when the cluster has no identity store yet.
///
/// # Errors
///
/// Returns an error if the replica count exceeds the configured limit, the
/// store cannot be opened, material cannot be generated, or reconciliation
/// fails after retries.
pub async fn reconcile(
    config: &PeerkeepConfig,
    spec: &ClusterSpec,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    config
        .check_replicas(spec.replicas)
        .with_context(|| format!("Refusing to reconcile cluster {}", spec.key()))?;
    let store = open_store(config).await?;
    let (material, bootstrap_peer) =
        BootstrapMaterial::generate(&mut Ed25519Generator::default(), &mut OsRng)
            .context("Failed to generate bootstrap material")?;
    info!(%bootstrap_peer, "Generated candidate bootstrap identity");

    let controller = Controller::new(store, RetryPolicy::from(&config.retry));
    controller
        .reconcile_with_retry(spec, &material, cancel)
        .await
        .with_context(|| format!("Failed to reconcile cluster {}", spec.key()))
}

/// One allocated replica as shown by `show`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PeerReport {
    pub index: u32,
    pub peer_id: String,
    /// Whether the stored private key decodes and derives `peer_id`.
    pub valid: bool,
}

/// Public view of a cluster's identity store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClusterReport {
    pub store: String,
    pub owner: Option<String>,
    pub allocated: u32,
    pub cluster_secret: bool,
    pub bootstrap_key: bool,
    pub peers: Vec<PeerReport>,
}

/// Describe the identity store of a cluster without revealing secrets.
///
/// # Errors
///
/// Returns an error if the store cannot be read or holds no identity store
/// for the cluster.
pub async fn show(
    config: &PeerkeepConfig,
    namespace: &str,
    name: &str,
    cancel: &CancellationToken,
) -> Result<ClusterReport> {
    let store = open_store(config).await?;
    let key = ObjectKey::new(namespace, peerkeep_reconciler::resource_name(name));
    let Some(record) = get_cancellable(store.as_ref(), Kind::Secret, &key, cancel)
        .await
        .with_context(|| format!("Failed to read {key}"))?
    else {
        bail!("No identity store {key}");
    };

    let snapshot = IdentityStore::from_record(&record);
    let peers = snapshot
        .indices()
        .into_iter()
        .map(|index| PeerReport {
            index,
            peer_id: snapshot
                .peer_id(index)
                .map(|raw| String::from_utf8_lossy(raw).into_owned())
                .unwrap_or_default(),
            valid: snapshot.identity(index).is_ok(),
        })
        .collect();

    Ok(ClusterReport {
        store: key.to_string(),
        owner: record
            .meta
            .controller()
            .map(|owner| format!("{}/{}", owner.kind, owner.name)),
        allocated: snapshot.allocated(),
        cluster_secret: snapshot.cluster_secret().is_some(),
        bootstrap_key: snapshot.bootstrap_private_key().is_some(),
        peers,
    })
}

/// Generate one identity from the OS RNG.
///
/// # Errors
///
/// Returns an error if the OS RNG fails.
pub fn keygen() -> Result<PeerIdentity> {
    Ed25519Generator::default()
        .generate()
        .context("Failed to generate identity")
}

fn print_outcome(outcome: &ReconcileOutcome) {
    println!(
        "{}: placeholder {}, identities {}",
        outcome.target, outcome.placeholder, outcome.identities
    );
    println!("  allocated: {}", outcome.allocated);
    if !outcome.added.is_empty() {
        let added: Vec<String> = outcome.added.iter().map(u32::to_string).collect();
        println!("  added: {}", added.join(", "));
    }
}

fn print_report(report: &ClusterReport) {
    println!("{}", report.store);
    if let Some(owner) = &report.owner {
        println!("  owner: {owner}");
    }
    println!(
        "  cluster secret: {}",
        if report.cluster_secret { "set" } else { "missing" }
    );
    println!(
        "  bootstrap key: {}",
        if report.bootstrap_key { "set" } else { "missing" }
    );
    println!("  allocated: {}", report.allocated);
    for peer in &report.peers {
        let status = if peer.valid { "" } else { " (invalid)" };
        println!("  {:>3}  {}{status}", peer.index, peer.peer_id);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use clap::Parser;

    use super::*;

    #[test]
    fn test_cluster_spec_defaults() {
        let config = PeerkeepConfig::default();
        let spec = cluster_spec(&config, "demo".to_string(), None, None, 3);
        assert_eq!(spec.namespace, config.default_namespace);
        assert_eq!(spec.uid, format!("{}/demo", config.default_namespace));
        assert_eq!(spec.replicas, 3);
    }

    #[test]
    fn test_store_dir_flag_wins() {
        let cli = Cli::try_parse_from(["peerkeep", "--store-dir", "/tmp/elsewhere", "keygen"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.store_dir, std::path::PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn test_keygen_produces_libp2p_peer_id() {
        let identity = keygen().unwrap();
        assert!(identity.peer_id.to_string().starts_with("12D3KooW"));
    }
}
