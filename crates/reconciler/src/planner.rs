//! Identity allocation planning.
//!
//! The planner compares the declared replica count with the identities
//! already persisted and produces an [`IdentityPlan`]: the complete entry set
//! the identity store should hold afterwards. Applying the plan is left to
//! the caller, through [`create_or_update`](peerkeep_store::create_or_update).

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use itertools::Itertools;
use peerkeep_core::{ObjectKey, ObjectMeta, OwnerReference};
use peerkeep_identity::{BootstrapMaterial, IdentityGenerator};
use peerkeep_store::{Kind, Record, Store, StoreError, get_cancellable};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::types::{
    BOOTSTRAP_PRIVATE_KEY_KEY, CLUSTER_SECRET_KEY, ClusterSpec, IdentityRecord, IdentityStore,
};

/// Outcome of [`compute_entries`].
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Complete entry set after allocation.
    pub entries: BTreeMap<String, Vec<u8>>,
    /// Identities generated by this allocation, in index order.
    pub added: Vec<IdentityRecord>,
    /// Whether the store did not exist yet.
    pub created: bool,
    /// Number of identities held after allocation.
    pub allocated: u32,
}

/// Compute the entry set the identity store of `desired` should hold.
///
/// With no `current` store, a fresh entry set is built holding the reserved
/// secrets from `material` and identities `0..replicas`. Otherwise the
/// identities `allocated..replicas` are appended and every existing entry is
/// kept as is; a store already holding `replicas` or more identities is
/// returned unchanged.
///
/// New identities are buffered and merged only once the whole batch has been
/// generated.
///
/// # Errors
///
/// - [`ReconcileError::Generation`] when the generator fails for any index
/// - [`ReconcileError::Inconsistent`] when `current` is not a dense range
pub fn compute_entries<G>(
    desired: &ClusterSpec,
    current: Option<&IdentityStore>,
    material: &BootstrapMaterial,
    generator: &mut G,
) -> Result<Allocation>
where
    G: IdentityGenerator + ?Sized,
{
    let (mut entries, allocated, created) = match current {
        None => {
            let entries = BTreeMap::from([
                (
                    CLUSTER_SECRET_KEY.to_string(),
                    material.cluster_secret().to_vec(),
                ),
                (
                    BOOTSTRAP_PRIVATE_KEY_KEY.to_string(),
                    material.bootstrap_private_key().to_vec(),
                ),
            ]);
            (entries, 0, true)
        }
        Some(store) => {
            if let Some(gap) = store.first_gap() {
                return Err(ReconcileError::inconsistent(
                    store.key(),
                    format!("replica {gap} is missing its peer id or private key"),
                ));
            }
            (store.entries().clone(), store.allocated(), false)
        }
    };

    let added = generate_batch(generator, allocated..desired.replicas)?;
    for record in &added {
        entries.extend(record.entries());
    }

    Ok(Allocation {
        entries,
        added,
        created,
        allocated: allocated.max(desired.replicas),
    })
}

/// Generate one identity per index, failing the whole batch on the first error.
fn generate_batch<G>(generator: &mut G, indices: Range<u32>) -> Result<Vec<IdentityRecord>>
where
    G: IdentityGenerator + ?Sized,
{
    indices
        .map(|index| {
            generator
                .generate()
                .map(|identity| IdentityRecord::new(index, identity))
                .map_err(|e| ReconcileError::generation(index, e))
        })
        .collect()
}

/// Planned state of one identity store.
#[derive(Debug, Clone)]
pub struct IdentityPlan {
    /// Key of the identity store.
    pub target: ObjectKey,
    /// Controller reference to the owning cluster.
    pub owner: OwnerReference,
    /// Complete entry set to persist.
    pub entries: BTreeMap<String, Vec<u8>>,
    /// Indices allocated by this plan.
    pub added: Vec<u32>,
    /// Whether the store is created by this plan.
    pub created: bool,
    /// Identities held once the plan is applied.
    pub allocated: u32,
    /// Version of the object the plan was computed from, zero if absent.
    pub base_version: u64,
}

impl IdentityPlan {
    /// Whether applying the plan leaves the entries untouched.
    pub fn is_noop(&self) -> bool {
        !self.created && self.added.is_empty()
    }

    /// Copy the planned entries and owner onto `record`.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Persist`] with a conflict when `record` is not the
    ///   version the plan was computed from
    /// - [`ReconcileError::Link`] when `record` cannot take the owner
    pub fn apply(&self, record: &mut Record) -> Result<()> {
        if record.meta.resource_version != self.base_version {
            return Err(ReconcileError::persist(
                &self.target,
                StoreError::Conflict {
                    kind: Kind::Secret,
                    key: self.target.clone(),
                    expected: self.base_version,
                    actual: record.meta.resource_version,
                },
            ));
        }
        record
            .meta
            .set_controller_reference(&self.owner, &self.target.namespace)
            .map_err(|e| ReconcileError::link(&self.target, e))?;
        record.data.clone_from(&self.entries);
        Ok(())
    }
}

/// Plans identity stores against a [`Store`], drawing fresh identities from
/// an [`IdentityGenerator`].
pub struct IdentityPlanner {
    store: Arc<dyn Store>,
    generator: Mutex<Box<dyn IdentityGenerator + Send>>,
}

impl IdentityPlanner {
    /// Create a new planner.
    pub fn new(store: Arc<dyn Store>, generator: impl IdentityGenerator + Send + 'static) -> Self {
        Self {
            store,
            generator: Mutex::new(Box::new(generator)),
        }
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Read the current identity store of `desired`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Lookup`] for any failure other than "not
    /// found", including cancellation.
    pub async fn current(
        &self,
        desired: &ClusterSpec,
        cancel: &CancellationToken,
    ) -> Result<Option<Record>> {
        let target = desired.resource_key();
        match get_cancellable(self.store.as_ref(), Kind::Secret, &target, cancel).await {
            Ok(found) => Ok(found),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ReconcileError::lookup(&target, e)),
        }
    }

    /// Plan the identity store of `desired`.
    ///
    /// `material` only matters when the store does not exist yet. Missing
    /// identities are generated inline while holding the generator lock, so
    /// the time spent grows with the number of replicas added.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Lookup`], [`ReconcileError::Generation`],
    /// [`ReconcileError::Inconsistent`] or [`ReconcileError::Link`]; nothing
    /// is written in any case.
    pub async fn plan(
        &self,
        desired: &ClusterSpec,
        material: &BootstrapMaterial,
        cancel: &CancellationToken,
    ) -> Result<IdentityPlan> {
        let target = desired.resource_key();
        let existing = self.current(desired, cancel).await?;
        let snapshot = existing.as_ref().map(IdentityStore::from_record);

        // Key generation is CPU-bound and runs on this task, one Ed25519 key
        // per missing replica. Callers bound `replicas` before getting here.
        let allocation = {
            let mut generator = self.generator.lock().await;
            compute_entries(desired, snapshot.as_ref(), material, &mut **generator)?
        };

        let (mut meta, base_version) = match existing {
            Some(record) => {
                let version = record.meta.resource_version;
                (record.meta, version)
            }
            None => (ObjectMeta::new(&target), 0),
        };
        let owner = desired.owner_reference();
        meta.set_controller_reference(&owner, &desired.namespace)
            .map_err(|e| ReconcileError::link(&target, e))?;

        let allocated = allocation.allocated;
        let added = allocation.added.iter().map(|r| r.index).collect_vec();
        debug!(
            cluster = %desired.name,
            namespace = %desired.namespace,
            desired = desired.replicas,
            allocated,
            added = added.len(),
            created = allocation.created,
            "Planned identity store"
        );

        Ok(IdentityPlan {
            target,
            owner,
            entries: allocation.entries,
            added,
            created: allocation.created,
            allocated,
            base_version,
        })
    }
}
