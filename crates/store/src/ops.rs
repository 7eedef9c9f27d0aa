//! Find-or-create-then-patch.

use peerkeep_core::ObjectKey;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::StoreError;
use crate::record::{Kind, Record};
use crate::store::{Store, get_cancellable};

/// What [`create_or_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl OperationResult {
    /// Lowercase name for logs and CLI output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for OperationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch the object at `key` (or start from an empty one), run `mutate` on
/// it, and persist the result if anything changed.
///
/// `mutate` must not change the object's kind, name or namespace.
///
/// # Errors
///
/// Returns the first error of the lookup, of `mutate`, or of the write.
pub async fn create_or_update<S, F, E>(
    store: &S,
    kind: Kind,
    key: &ObjectKey,
    cancel: &CancellationToken,
    mutate: F,
) -> Result<(Record, OperationResult), E>
where
    S: Store + ?Sized,
    F: FnOnce(&mut Record) -> Result<(), E>,
    E: From<StoreError>,
{
    let current = get_cancellable(store, kind, key, cancel).await?;

    let Some(existing) = current else {
        let mut record = Record::new(kind, key);
        mutate(&mut record)?;
        ensure_same_object(kind, key, &record)?;
        let created = store.create(record).await?;
        debug!(%kind, %key, "Object created");
        return Ok((created, OperationResult::Created));
    };

    let mut record = existing.clone();
    mutate(&mut record)?;
    ensure_same_object(kind, key, &record)?;
    if record == existing {
        return Ok((existing, OperationResult::Unchanged));
    }

    let updated = store.update(record).await?;
    debug!(%kind, %key, version = updated.meta.resource_version, "Object updated");
    Ok((updated, OperationResult::Updated))
}

fn ensure_same_object(kind: Kind, key: &ObjectKey, record: &Record) -> Result<(), StoreError> {
    if record.kind != kind || record.key() != *key {
        return Err(StoreError::InvalidMutation {
            kind,
            key: key.clone(),
            reason: format!("mutation moved object to {} '{}'", record.kind, record.key()),
        });
    }
    Ok(())
}
