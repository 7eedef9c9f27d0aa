//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// peerkeep - peer identities for IPFS Cluster
#[derive(Parser, Debug)]
#[command(name = "peerkeep")]
#[command(version)]
#[command(about = "Allocates and persists peer identities for IPFS Cluster replicas")]
#[command(
    long_about = "peerkeep keeps one identity store per cluster holding the shared cluster secret, the bootstrap key, and a stable libp2p identity for every replica ever declared."
)]
pub struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(long, global = true, env = "PEERKEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Store directory, overriding the configuration
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Converge a cluster's identity store with its replica count
    Reconcile {
        /// Cluster name
        #[arg(long)]
        name: String,

        /// Cluster namespace (defaults to the configured namespace)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Declared number of replicas
        #[arg(short, long)]
        replicas: u32,

        /// Unique id of the cluster (defaults to "<namespace>/<name>")
        #[arg(long)]
        uid: Option<String>,
    },

    /// Show the allocated peer ids of a cluster
    Show {
        /// Cluster name
        #[arg(long)]
        name: String,

        /// Cluster namespace (defaults to the configured namespace)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Output as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Generate one fresh peer identity
    Keygen {
        /// Also print the private key
        #[arg(long, default_value_t = false)]
        reveal: bool,
    },
}
