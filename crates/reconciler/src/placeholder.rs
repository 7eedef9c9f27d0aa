//! Data-less identity placeholder owned by each cluster.
//!
//! Every cluster gets a `ServiceAccount` object named like its identity
//! store. It carries no data, only the controller reference back to the
//! cluster, so reconciling it is either a create or a no-op.

use peerkeep_core::{ObjectKey, ObjectMeta, OwnerReference};
use peerkeep_store::Record;

use crate::error::{ReconcileError, Result};
use crate::types::ClusterSpec;

/// Expected state of a cluster's placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderPlan {
    pub target: ObjectKey,
    pub owner: OwnerReference,
}

impl PlaceholderPlan {
    /// Link `record` to the owning cluster.
    ///
    /// Leaves an already linked record unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Link`] if another owner controls `record`.
    pub fn apply(&self, record: &mut Record) -> Result<()> {
        record
            .meta
            .set_controller_reference(&self.owner, &self.target.namespace)
            .map_err(|e| ReconcileError::link(&self.target, e))
    }
}

/// Plans placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderPlanner;

impl PlaceholderPlanner {
    /// Plan the placeholder of `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Link`] when the cluster cannot own objects,
    /// for example because it has no uid.
    pub fn plan(desired: &ClusterSpec) -> Result<PlaceholderPlan> {
        let target = desired.resource_key();
        let owner = desired.owner_reference();
        ObjectMeta::new(&target)
            .set_controller_reference(&owner, &desired.namespace)
            .map_err(|e| ReconcileError::link(&target, e))?;
        Ok(PlaceholderPlan { target, owner })
    }
}
