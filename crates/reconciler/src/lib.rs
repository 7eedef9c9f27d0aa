//! K8s-style reconciliation of IPFS Cluster peer identities.
//!
//! Each cluster declares how many replicas it wants. Every replica needs a
//! stable libp2p identity, so the reconciler keeps one identity store per
//! cluster holding:
//!
//! - `CLUSTER_SECRET` and `BOOTSTRAP_PEER_PRIV_KEY`, written once
//! - `peerID-<i>` / `privateKey-<i>` for every allocated replica `i`
//!
//! # Key Concepts
//!
//! ## Reconciliation
//!
//! On every pass the controller:
//! 1. Ensures the cluster's placeholder object exists and is owned by it
//! 2. Reads the current identity store
//! 3. Plans the entry set, allocating identities for missing replicas
//! 4. Applies the plan through find-or-create-then-patch
//!
//! Identities are never removed or regenerated. Scaling down keeps the
//! surplus, so scaling back up reuses the same peer ids.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use peerkeep_identity::BootstrapMaterial;
//! use peerkeep_reconciler::{ClusterSpec, Controller, RetryPolicy};
//! use peerkeep_store::InMemoryStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), peerkeep_reconciler::ReconcileError> {
//! let controller = Controller::new(Arc::new(InMemoryStore::new()), RetryPolicy::default());
//! let spec = ClusterSpec::new("default", "demo", "3f2a", 3);
//! let material = BootstrapMaterial::new(b"secret".to_vec(), b"key".to_vec());
//!
//! let outcome = controller
//!     .reconcile(&spec, &material, &CancellationToken::new())
//!     .await?;
//! assert_eq!(outcome.allocated, 3);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod controller;
pub mod error;
pub mod placeholder;
pub mod planner;
pub mod types;

// Re-export main types
pub use controller::{Controller, ReconcileOutcome, ReconcileRequest, RetryPolicy, RunSummary};
pub use error::{EntryError, ReconcileError, Result};
pub use placeholder::{PlaceholderPlan, PlaceholderPlanner};
pub use planner::{Allocation, IdentityPlan, IdentityPlanner, compute_entries};
pub use types::{
    BOOTSTRAP_PRIVATE_KEY_KEY, CLUSTER_KIND, CLUSTER_SECRET_KEY, ClusterSpec, IdentityRecord,
    IdentityStore, PEER_ID_PREFIX, PRIVATE_KEY_PREFIX, peer_id_key, private_key_key,
    resource_name,
};
