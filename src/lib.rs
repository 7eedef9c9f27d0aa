//! # peerkeep
//!
//! Allocates and persists peer identities for IPFS Cluster replicas.
//!
//! The binary wires the workspace crates together: configuration from
//! `peerkeep-core`, the file store from `peerkeep-store`, and the controller
//! from `peerkeep-reconciler`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cli;
pub mod commands;

pub use peerkeep_core;
pub use peerkeep_identity;
pub use peerkeep_reconciler;
pub use peerkeep_store;
