//! Core types, errors, and configuration shared across peerkeep crates.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod meta;

pub use config::{PeerkeepConfig, RetryConfig};
pub use error::{Error, Result};
pub use meta::{ObjectKey, ObjectMeta, OwnerReference, OwnershipError, validate_name};
