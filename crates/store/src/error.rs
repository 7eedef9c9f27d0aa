//! Error types for the store crate.

use std::path::PathBuf;

use peerkeep_core::ObjectKey;
use thiserror::Error;

use crate::record::Kind;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: Kind, key: ObjectKey },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    /// The record was written by someone else since it was read.
    #[error("{kind} '{key}' was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid mutation of {kind} '{key}': {reason}")]
    InvalidMutation {
        kind: Kind,
        key: ObjectKey,
        reason: String,
    },

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// The backend cannot serve requests right now.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error(transparent)]
    InvalidKey(#[from] peerkeep_core::Error),
}

impl StoreError {
    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether this error means the object does not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether retrying the same operation later may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Unavailable { .. } | Self::Io { .. } | Self::AlreadyExists { .. }
        )
    }
}
