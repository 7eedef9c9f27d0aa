//! Peer identities for IPFS Cluster replicas.
//!
//! Each replica of a cluster is a libp2p peer identified by an Ed25519 key.
//! This crate produces those keys and encodes them exactly the way IPFS
//! Cluster reads them back:
//!
//! - [`PeerId`] - the libp2p peer id of the public key (`12D3KooW...`)
//! - [`PrivateKey`] - base64 of the libp2p protobuf private key
//! - [`ClusterSecret`] - 32 random bytes, hex encoded
//!
//! # Example
//!
//! ```
//! use peerkeep_identity::{Ed25519Generator, IdentityGenerator};
//!
//! let identity = Ed25519Generator::default().generate()?;
//! assert!(identity.peer_id.to_string().starts_with("12D3KooW"));
//! # Ok::<(), peerkeep_identity::GenerationError>(())
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod generator;
pub mod key;
pub mod secret;

pub use error::{GenerationError, KeyParsingError};
pub use generator::{Ed25519Generator, IdentityGenerator, PeerIdentity};
pub use key::{PrivateKey, SEED_LENGTH};
pub use libp2p_identity::PeerId;
pub use secret::{BootstrapMaterial, ClusterSecret};
