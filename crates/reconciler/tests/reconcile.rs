//! End-to-end reconciliation scenarios against the in-memory store.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use peerkeep_core::{ObjectKey, OwnerReference};
use peerkeep_identity::{
    BootstrapMaterial, Ed25519Generator, GenerationError, IdentityGenerator, PeerIdentity,
};
use peerkeep_reconciler::{
    BOOTSTRAP_PRIVATE_KEY_KEY, CLUSTER_SECRET_KEY, ClusterSpec, Controller, IdentityPlanner,
    IdentityStore, ReconcileError, ReconcileRequest, RetryPolicy, peer_id_key, private_key_key,
};
use peerkeep_store::{InMemoryStore, Kind, OperationResult, Record, Store, StoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn spec(replicas: u32) -> ClusterSpec {
    ClusterSpec::new("default", "demo", "uid-1", replicas)
}

fn material() -> BootstrapMaterial {
    BootstrapMaterial::new(b"cluster-secret".to_vec(), b"bootstrap-key".to_vec())
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, 1, 2).without_jitter()
}

async fn identities(store: &InMemoryStore) -> Option<Record> {
    store
        .get(Kind::Secret, &spec(0).resource_key())
        .await
        .unwrap()
}

async fn entries(store: &InMemoryStore) -> BTreeMap<String, Vec<u8>> {
    identities(store).await.unwrap().data
}

/// Succeeds `budget` times, then fails every call.
struct FlakyGenerator {
    inner: Ed25519Generator<rand::rngs::OsRng>,
    budget: Arc<AtomicUsize>,
}

impl FlakyGenerator {
    fn new(budget: usize) -> (Self, Arc<AtomicUsize>) {
        let budget = Arc::new(AtomicUsize::new(budget));
        let generator = Self {
            inner: Ed25519Generator::default(),
            budget: Arc::clone(&budget),
        };
        (generator, budget)
    }
}

impl IdentityGenerator for FlakyGenerator {
    fn generate(&mut self) -> Result<PeerIdentity, GenerationError> {
        let left = self.budget.load(Ordering::SeqCst);
        if left == 0 {
            return Err(GenerationError::Entropy(rand_core::Error::new(
                "entropy exhausted",
            )));
        }
        self.budget.store(left - 1, Ordering::SeqCst);
        self.inner.generate()
    }
}

/// Fails the first `failures` reads of identity stores.
struct UnreliableStore {
    inner: InMemoryStore,
    failures: AtomicUsize,
}

impl UnreliableStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl Store for UnreliableStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> peerkeep_store::Result<Option<Record>> {
        if kind == Kind::Secret
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::unavailable("connection refused"));
        }
        self.inner.get(kind, key).await
    }

    async fn create(&self, record: Record) -> peerkeep_store::Result<Record> {
        self.inner.create(record).await
    }

    async fn update(&self, record: Record) -> peerkeep_store::Result<Record> {
        self.inner.update(record).await
    }
}

#[tokio::test]
async fn fresh_cluster_gets_secrets_and_identities() {
    let store = Arc::new(InMemoryStore::new());
    let controller = Controller::new(store.clone(), fast_retry());

    let outcome = controller
        .reconcile(&spec(3), &material(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.identities, OperationResult::Created);
    assert_eq!(outcome.added, vec![0, 1, 2]);

    let data = entries(&store).await;
    assert_eq!(data.len(), 8);
    assert_eq!(data[CLUSTER_SECRET_KEY], b"cluster-secret");
    assert_eq!(data[BOOTSTRAP_PRIVATE_KEY_KEY], b"bootstrap-key");
    for i in 0..3 {
        assert!(data.contains_key(&peer_id_key(i)));
        assert!(data.contains_key(&private_key_key(i)));
    }

    let placeholder = store
        .get(Kind::ServiceAccount, &spec(0).resource_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(placeholder.meta.controller().unwrap().uid, "uid-1");
    assert!(placeholder.data.is_empty());
}

#[tokio::test]
async fn stored_keys_derive_stored_peer_ids() {
    let store = Arc::new(InMemoryStore::new());
    let controller = Controller::new(store.clone(), fast_retry());
    controller
        .reconcile(&spec(4), &material(), &CancellationToken::new())
        .await
        .unwrap();

    let snapshot = IdentityStore::from_record(&identities(&store).await.unwrap());
    assert!(snapshot.is_dense());
    for i in 0..4 {
        let identity = snapshot.identity(i).unwrap();
        assert!(identity.peer_id.to_string().starts_with("12D3KooW"));
        assert_eq!(identity.private_key.peer_id(), identity.peer_id);
    }
}

#[tokio::test]
async fn reconciling_twice_changes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let controller = Controller::new(store.clone(), fast_retry());
    let cancel = CancellationToken::new();

    controller.reconcile(&spec(3), &material(), &cancel).await.unwrap();
    let before = identities(&store).await.unwrap();

    let outcome = controller.reconcile(&spec(3), &material(), &cancel).await.unwrap();
    assert!(outcome.converged());
    assert_eq!(identities(&store).await.unwrap(), before);
}

#[tokio::test]
async fn growth_adds_exactly_the_new_replicas() {
    let store = Arc::new(InMemoryStore::new());
    let controller = Controller::new(store.clone(), fast_retry());
    let cancel = CancellationToken::new();

    controller.reconcile(&spec(3), &material(), &cancel).await.unwrap();
    let before = entries(&store).await;

    let outcome = controller.reconcile(&spec(5), &material(), &cancel).await.unwrap();
    assert_eq!(outcome.identities, OperationResult::Updated);
    assert_eq!(outcome.added, vec![3, 4]);

    let after = entries(&store).await;
    assert_eq!(after.len(), before.len() + 4);
    for (key, value) in &before {
        assert_eq!(&after[key], value, "{key} changed");
    }
    for key in [
        peer_id_key(3),
        private_key_key(3),
        peer_id_key(4),
        private_key_key(4),
    ] {
        assert!(after.contains_key(&key), "{key} missing");
    }
}

#[tokio::test]
async fn scale_down_and_up_reuses_identities() {
    let store = Arc::new(InMemoryStore::new());
    let controller = Controller::new(store.clone(), fast_retry());
    let cancel = CancellationToken::new();

    controller.reconcile(&spec(5), &material(), &cancel).await.unwrap();
    let original = entries(&store).await;

    let down = controller.reconcile(&spec(2), &material(), &cancel).await.unwrap();
    assert!(down.converged());
    assert_eq!(down.allocated, 5);

    let up = controller.reconcile(&spec(5), &material(), &cancel).await.unwrap();
    assert!(up.added.is_empty());
    assert_eq!(entries(&store).await, original);
}

#[tokio::test]
async fn reserved_secrets_are_never_overwritten() {
    let store = Arc::new(InMemoryStore::new());
    let controller = Controller::new(store.clone(), fast_retry());
    let cancel = CancellationToken::new();

    controller.reconcile(&spec(1), &material(), &cancel).await.unwrap();
    let other = BootstrapMaterial::new(b"rotated".to_vec(), b"rotated".to_vec());
    controller.reconcile(&spec(2), &other, &cancel).await.unwrap();

    let data = entries(&store).await;
    assert_eq!(data[CLUSTER_SECRET_KEY], b"cluster-secret");
    assert_eq!(data[BOOTSTRAP_PRIVATE_KEY_KEY], b"bootstrap-key");
}

#[tokio::test]
async fn zero_replicas_creates_only_secrets() {
    let store = Arc::new(InMemoryStore::new());
    let controller = Controller::new(store.clone(), fast_retry());

    let outcome = controller
        .reconcile(&spec(0), &material(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.allocated, 0);

    let data = entries(&store).await;
    assert_eq!(data.len(), 2);
    assert!(data.contains_key(CLUSTER_SECRET_KEY));
}

#[tokio::test]
async fn generation_failure_leaves_store_unchanged() {
    let store = Arc::new(InMemoryStore::new());
    let (generator, budget) = FlakyGenerator::new(usize::MAX);
    let controller = Controller::with_generator(store.clone(), generator, fast_retry());
    let cancel = CancellationToken::new();

    controller.reconcile(&spec(2), &material(), &cancel).await.unwrap();
    let before = identities(&store).await.unwrap();

    // Two of the three new identities succeed before the source runs dry.
    budget.store(2, Ordering::SeqCst);
    let err = controller
        .reconcile(&spec(5), &material(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Generation { index: 4, .. }));
    assert_eq!(identities(&store).await.unwrap(), before);
}

#[tokio::test]
async fn generation_failure_on_fresh_cluster_writes_no_identities() {
    let store = Arc::new(InMemoryStore::new());
    let (generator, _) = FlakyGenerator::new(1);
    let controller = Controller::with_generator(store.clone(), generator, fast_retry());

    let err = controller
        .reconcile(&spec(3), &material(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Generation { index: 1, .. }));
    assert!(identities(&store).await.is_none());
}

#[tokio::test]
async fn lookup_failure_persists_nothing() {
    let store = Arc::new(UnreliableStore::new(usize::MAX));
    let planner = IdentityPlanner::new(store.clone(), Ed25519Generator::default());

    let err = planner
        .plan(&spec(3), &material(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Lookup {
            source: StoreError::Unavailable { .. },
            ..
        }
    ));
    assert!(store.inner.is_empty().await);
}

#[tokio::test]
async fn foreign_controller_is_a_link_failure() {
    let store = Arc::new(InMemoryStore::new());
    let mut record = Record::new(Kind::Secret, &spec(0).resource_key());
    record
        .meta
        .set_controller_reference(
            &OwnerReference::controller("IpfsCluster", "other", "uid-2"),
            "default",
        )
        .unwrap();
    let before = store.create(record).await.unwrap();

    let controller = Controller::new(store.clone(), fast_retry());
    let err = controller
        .reconcile_with_retry(&spec(3), &material(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Link { .. }));
    assert!(!err.is_retryable());
    assert_eq!(identities(&store).await.unwrap(), before);
}

#[tokio::test]
async fn transient_lookup_failures_are_retried() {
    let store = Arc::new(UnreliableStore::new(2));
    let controller = Controller::new(store.clone(), fast_retry());

    let outcome = controller
        .reconcile_with_retry(&spec(2), &material(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.allocated, 2);
}

#[tokio::test]
async fn retries_give_up_after_max_attempts() {
    let store = Arc::new(UnreliableStore::new(usize::MAX));
    let controller = Controller::new(store, fast_retry());

    let err = controller
        .reconcile_with_retry(&spec(2), &material(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn queued_requests_for_one_cluster_are_serialized() {
    let store = Arc::new(InMemoryStore::new());
    let controller = Arc::new(Controller::new(store.clone(), fast_retry()));
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let runner = tokio::spawn(Arc::clone(&controller).run(rx, cancel.clone()));

    for replicas in [3, 3, 4, 2, 4] {
        tx.send(ReconcileRequest {
            spec: spec(replicas),
            material: material(),
        })
        .await
        .unwrap();
    }
    tx.send(ReconcileRequest {
        spec: ClusterSpec::new("default", "other", "uid-3", 1),
        material: material(),
    })
    .await
    .unwrap();
    drop(tx);

    let summary = runner.await.unwrap();
    assert_eq!(summary.succeeded, 6);
    assert_eq!(summary.failed, 0);

    let snapshot = IdentityStore::from_record(&identities(&store).await.unwrap());
    assert!(snapshot.is_dense());
    assert_eq!(snapshot.allocated(), 4);
}
