//! Controller driving reconciliations of cluster identity stores.
//!
//! The controller is the orchestration layer around the planners: it
//! serializes work per cluster, applies plans through
//! [`create_or_update`], and requeues failed attempts with exponential
//! backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use peerkeep_core::{ObjectKey, RetryConfig};
use peerkeep_identity::{BootstrapMaterial, Ed25519Generator, IdentityGenerator};
use peerkeep_store::{Kind, OperationResult, Record, Store, StoreError, create_or_update};
use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ReconcileError, Result};
use crate::placeholder::PlaceholderPlanner;
use crate::planner::IdentityPlanner;
use crate::types::ClusterSpec;

/// Backoff between requeued reconciliations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff_ms: config.base_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            use_jitter: config.use_jitter,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_ms,
            max_backoff_ms,
            use_jitter: true,
        }
    }

    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        let capped_delay = exponential_delay.min(self.max_backoff_ms);

        if self.use_jitter {
            let jitter_range = (capped_delay / 4).max(1);
            let jitter = rand::thread_rng().gen_range(0..jitter_range);
            Duration::from_millis(capped_delay.saturating_add(jitter))
        } else {
            Duration::from_millis(capped_delay)
        }
    }

    /// Whether another attempt follows failed attempt number `attempt`.
    #[must_use]
    pub const fn is_retryable(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// What one reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Key of the identity store and placeholder.
    pub target: ObjectKey,
    pub placeholder: OperationResult,
    pub identities: OperationResult,
    /// Identities held after the reconciliation.
    pub allocated: u32,
    /// Indices allocated by this reconciliation.
    pub added: Vec<u32>,
}

impl ReconcileOutcome {
    /// Whether nothing had to be written.
    pub fn converged(&self) -> bool {
        self.placeholder == OperationResult::Unchanged
            && self.identities == OperationResult::Unchanged
    }
}

/// A queued reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub spec: ClusterSpec,
    /// Values for the reserved secrets, used only on first creation.
    pub material: BootstrapMaterial,
}

/// Tally of a [`Controller::run`] session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, joined: std::result::Result<bool, JoinError>) {
        match joined {
            Ok(true) => self.succeeded = self.succeeded.saturating_add(1),
            Ok(false) => self.failed = self.failed.saturating_add(1),
            Err(e) => {
                error!(error = %e, "Reconciliation task aborted");
                self.failed = self.failed.saturating_add(1);
            }
        }
    }
}

/// One async mutex per object key.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<ObjectKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: ObjectKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().await;
            // Drop idle slots: only the map itself still holds them.
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        slot.lock_owned().await
    }
}

/// Error of a mutation run inside [`create_or_update`].
enum ApplyError {
    Store(StoreError),
    Plan(ReconcileError),
}

impl From<StoreError> for ApplyError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Reconciles clusters against a store.
pub struct Controller {
    store: Arc<dyn Store>,
    planner: IdentityPlanner,
    retry: RetryPolicy,
    locks: KeyedLocks,
}

impl Controller {
    /// Create a controller drawing identities from the OS RNG.
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self::with_generator(store, Ed25519Generator::default(), retry)
    }

    /// Create a controller with a custom identity source.
    pub fn with_generator(
        store: Arc<dyn Store>,
        generator: impl IdentityGenerator + Send + 'static,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            planner: IdentityPlanner::new(Arc::clone(&store), generator),
            store,
            retry,
            locks: KeyedLocks::default(),
        }
    }

    /// Get the retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Reconcile one cluster once: ensure its placeholder, then grow its
    /// identity store to `desired.replicas`.
    ///
    /// Reconciliations of the same cluster never overlap.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReconcileError`]; the identity store is left as it
    /// was whenever planning fails.
    pub async fn reconcile(
        &self,
        desired: &ClusterSpec,
        material: &BootstrapMaterial,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let _guard = self.locks.lock(desired.resource_key()).await;
        info!(
            cluster = %desired.name,
            namespace = %desired.namespace,
            desired = desired.replicas,
            "Starting reconciliation"
        );

        let placeholder = PlaceholderPlanner::plan(desired)?;
        let (_, placeholder_op) = self
            .persist(Kind::ServiceAccount, &placeholder.target, cancel, |record| {
                placeholder.apply(record)
            })
            .await?;

        let plan = self.planner.plan(desired, material, cancel).await?;
        let (_, identities_op) = self
            .persist(Kind::Secret, &plan.target, cancel, |record| plan.apply(record))
            .await?;

        let outcome = ReconcileOutcome {
            target: plan.target,
            placeholder: placeholder_op,
            identities: identities_op,
            allocated: plan.allocated,
            added: plan.added,
        };

        if outcome.converged() {
            info!(
                cluster = %desired.name,
                namespace = %desired.namespace,
                allocated = outcome.allocated,
                "Cluster converged"
            );
        } else {
            info!(
                cluster = %desired.name,
                namespace = %desired.namespace,
                allocated = outcome.allocated,
                added = outcome.added.len(),
                placeholder = %outcome.placeholder,
                identities = %outcome.identities,
                "Reconciliation complete"
            );
        }
        Ok(outcome)
    }

    /// Reconcile, requeueing retryable failures with backoff.
    ///
    /// # Errors
    ///
    /// Returns the last error once it is not retryable, attempts are
    /// exhausted, or `cancel` fires while waiting.
    pub async fn reconcile_with_retry(
        &self,
        desired: &ClusterSpec,
        material: &BootstrapMaterial,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let mut attempt = 1u32;
        loop {
            match self.reconcile(desired, material, cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && self.retry.is_retryable(attempt) => {
                    let delay = self.retry.calculate_backoff(attempt);
                    warn!(
                        cluster = %desired.name,
                        namespace = %desired.namespace,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Reconciliation failed, requeueing"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(e),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => {
                    error!(
                        cluster = %desired.name,
                        namespace = %desired.namespace,
                        attempt,
                        error = %e,
                        "Reconciliation failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Process queued requests until the channel closes or `cancel` fires.
    ///
    /// Requests for different clusters run concurrently; requests for the
    /// same cluster run one after the other. In-flight work is awaited
    /// before returning.
    pub async fn run(
        self: Arc<Self>,
        mut requests: mpsc::Receiver<ReconcileRequest>,
        cancel: CancellationToken,
    ) -> RunSummary {
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => summary.record(joined),
                request = requests.recv() => {
                    let Some(request) = request else { break };
                    debug!(cluster = %request.spec.name, "Dequeued reconciliation");
                    let controller = Arc::clone(&self);
                    let cancel = cancel.clone();
                    tasks.spawn(async move {
                        controller
                            .reconcile_with_retry(&request.spec, &request.material, &cancel)
                            .await
                            .is_ok()
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Controller stopped"
        );
        summary
    }

    async fn persist<F>(
        &self,
        kind: Kind,
        key: &ObjectKey,
        cancel: &CancellationToken,
        mutate: F,
    ) -> Result<(Record, OperationResult)>
    where
        F: FnOnce(&mut Record) -> Result<()>,
    {
        create_or_update(self.store.as_ref(), kind, key, cancel, |record| {
            mutate(record).map_err(ApplyError::Plan)
        })
        .await
        .map_err(|e| match e {
            ApplyError::Store(source) => ReconcileError::persist(key, source),
            ApplyError::Plan(e) => e,
        })
    }
}
