//! Error types for the reconciler crate.

use peerkeep_core::{ObjectKey, OwnershipError};
use peerkeep_identity::{GenerationError, KeyParsingError};
use peerkeep_store::StoreError;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Reconciliation failures.
///
/// Every variant leaves persisted state untouched; the controller logs it and
/// requeues when [`ReconcileError::is_retryable`] says so.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reading the current state failed for a reason other than "not found".
    #[error("failed to look up '{key}': {source}")]
    Lookup {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    /// A fresh identity could not be generated. The whole batch is discarded.
    #[error("failed to generate identity {index}: {source}")]
    Generation {
        index: u32,
        #[source]
        source: GenerationError,
    },

    /// The object could not be linked to its owning cluster.
    #[error("failed to link '{key}' to its owner: {source}")]
    Link {
        key: ObjectKey,
        #[source]
        source: OwnershipError,
    },

    /// The planned change could not be written.
    #[error("failed to persist '{key}': {source}")]
    Persist {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    /// The stored identities are not a dense `0..allocated` range.
    #[error("identity store '{key}' is inconsistent: {reason}")]
    Inconsistent { key: ObjectKey, reason: String },
}

impl ReconcileError {
    /// Create a lookup error.
    pub fn lookup(key: &ObjectKey, source: StoreError) -> Self {
        Self::Lookup {
            key: key.clone(),
            source,
        }
    }

    /// Create a generation error.
    pub const fn generation(index: u32, source: GenerationError) -> Self {
        Self::Generation { index, source }
    }

    /// Create a link error.
    pub fn link(key: &ObjectKey, source: OwnershipError) -> Self {
        Self::Link {
            key: key.clone(),
            source,
        }
    }

    /// Create a persist error.
    pub fn persist(key: &ObjectKey, source: StoreError) -> Self {
        Self::Persist {
            key: key.clone(),
            source,
        }
    }

    /// Create an inconsistency error.
    pub fn inconsistent(key: &ObjectKey, reason: impl Into<String>) -> Self {
        Self::Inconsistent {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Whether requeueing the reconciliation may succeed.
    ///
    /// Cancellation, ownership and inconsistency errors need outside
    /// intervention and are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Lookup { source, .. } | Self::Persist { source, .. } => source.is_transient(),
            Self::Generation { .. } => true,
            Self::Link { .. } | Self::Inconsistent { .. } => false,
        }
    }

    /// Whether this error was caused by cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Lookup {
                source: StoreError::Cancelled,
                ..
            } | Self::Persist {
                source: StoreError::Cancelled,
                ..
            }
        )
    }
}

/// A stored identity entry that cannot be decoded.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry '{key}' is missing")]
    Missing { key: String },

    #[error("entry '{key}' is not valid UTF-8")]
    NotUtf8 { key: String },

    #[error("entry '{key}' is invalid: {source}")]
    Invalid {
        key: String,
        #[source]
        source: KeyParsingError,
    },

    /// The private key of a replica does not derive its stored peer id.
    #[error("private key of replica {index} does not match its peer id")]
    Mismatch { index: u32 },
}
