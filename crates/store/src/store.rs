//! Store trait and helpers.

use async_trait::async_trait;
use peerkeep_core::ObjectKey;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};
use crate::record::{Kind, Record};

/// Trait for object storage backends.
///
/// Writes use optimistic concurrency: `update` only succeeds when the
/// record's `resource_version` matches the stored one, and every successful
/// write returns the record with its new version.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch an object, `None` if it does not exist.
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Record>>;

    /// Persist a new object.
    async fn create(&self, record: Record) -> Result<Record>;

    /// Replace an existing object.
    async fn update(&self, record: Record) -> Result<Record>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Record>> {
        (**self).get(kind, key).await
    }

    async fn create(&self, record: Record) -> Result<Record> {
        (**self).create(record).await
    }

    async fn update(&self, record: Record) -> Result<Record> {
        (**self).update(record).await
    }
}

/// Fetch an object, giving up when `cancel` fires.
///
/// # Errors
///
/// Returns [`StoreError::Cancelled`] on cancellation, otherwise whatever the
/// backend returns.
pub async fn get_cancellable<S: Store + ?Sized>(
    store: &S,
    kind: Kind,
    key: &ObjectKey,
    cancel: &CancellationToken,
) -> Result<Option<Record>> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StoreError::Cancelled),
        result = store.get(kind, key) => result,
    }
}

/// A wrapper that adds tracing to a store.
pub struct TracingStore<S: Store> {
    inner: S,
}

impl<S: Store> TracingStore<S> {
    /// Create a new tracing store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: Store> Store for TracingStore<S> {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Record>> {
        tracing::debug!(%kind, %key, "Reading object");
        let result = self.inner.get(kind, key).await;
        if let Ok(ref found) = result {
            tracing::trace!(%kind, %key, found = found.is_some(), "Object read");
        }
        result
    }

    async fn create(&self, record: Record) -> Result<Record> {
        tracing::debug!(kind = %record.kind, key = %record.key(), entries = record.data.len(), "Creating object");
        let result = self.inner.create(record).await;
        if let Ok(ref created) = result {
            tracing::trace!(version = created.meta.resource_version, "Object created");
        }
        result
    }

    async fn update(&self, record: Record) -> Result<Record> {
        tracing::debug!(
            kind = %record.kind,
            key = %record.key(),
            version = record.meta.resource_version,
            entries = record.data.len(),
            "Updating object"
        );
        let result = self.inner.update(record).await;
        if let Ok(ref updated) = result {
            tracing::trace!(version = updated.meta.resource_version, "Object updated");
        }
        result
    }
}
