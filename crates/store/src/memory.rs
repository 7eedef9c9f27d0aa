//! In-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use peerkeep_core::ObjectKey;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::record::{Kind, Record};
use crate::store::Store;

/// In-memory store for tests and single-process use.
#[derive(Default)]
pub struct InMemoryStore {
    objects: RwLock<HashMap<(Kind, ObjectKey), Record>>,
}

impl InMemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Record>> {
        let objects = self.objects.read().await;
        Ok(objects.get(&(kind, key.clone())).cloned())
    }

    async fn create(&self, mut record: Record) -> Result<Record> {
        let key = record.key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&(record.kind, key.clone())) {
            return Err(StoreError::AlreadyExists {
                kind: record.kind,
                key,
            });
        }

        record.meta.resource_version = 1;
        objects.insert((record.kind, key), record.clone());
        Ok(record)
    }

    async fn update(&self, mut record: Record) -> Result<Record> {
        let key = record.key();
        let mut objects = self.objects.write().await;
        let Some(current) = objects.get_mut(&(record.kind, key.clone())) else {
            return Err(StoreError::NotFound {
                kind: record.kind,
                key,
            });
        };
        if current.meta.resource_version != record.meta.resource_version {
            return Err(StoreError::Conflict {
                kind: record.kind,
                key,
                expected: record.meta.resource_version,
                actual: current.meta.resource_version,
            });
        }

        record.meta.resource_version = current.meta.resource_version.saturating_add(1);
        *current = record.clone();
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn secret(name: &str) -> Record {
        Record::new(Kind::Secret, &ObjectKey::new("default", name))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryStore::new();
        assert!(store.is_empty().await);

        let created = store.create(secret("a")).await.unwrap();
        assert_eq!(created.meta.resource_version, 1);

        let found = store
            .get(Kind::Secret, &ObjectKey::new("default", "a"))
            .await
            .unwrap();
        assert_eq!(found, Some(created));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let store = InMemoryStore::new();
        store.create(secret("a")).await.unwrap();

        let found = store
            .get(Kind::ServiceAccount, &ObjectKey::new("default", "a"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = InMemoryStore::new();
        store.create(secret("a")).await.unwrap();
        let err = store.create(secret("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = InMemoryStore::new();
        let mut record = store.create(secret("a")).await.unwrap();
        record.data.insert("k".to_string(), b"v".to_vec());

        let updated = store.update(record).await.unwrap();
        assert_eq!(updated.meta.resource_version, 2);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryStore::new();
        let first = store.create(secret("a")).await.unwrap();
        let stale = first.clone();
        store.update(first).await.unwrap();

        let err = store.update(stale).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let store = InMemoryStore::new();
        let err = store.update(secret("a")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
