//! On-disk store keeping one JSON document per object.
//!
//! Layout: `<root>/<kind>/<namespace>/<name>.json`. Writes go to a sibling
//! temp file first and are renamed into place, so readers never observe a
//! half-written object.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use peerkeep_core::ObjectKey;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::record::{Kind, Record};
use crate::store::Store;

/// File-backed store.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes read-check-write sequences within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(&root, e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document holding `key`. Validates the key first so names
    /// can never escape the store root.
    fn path_for(&self, kind: Kind, key: &ObjectKey) -> Result<PathBuf> {
        key.validate()?;
        Ok(self
            .root
            .join(kind.as_str())
            .join(&key.namespace)
            .join(format!("{}.json", key.name)))
    }

    async fn read(&self, path: &Path) -> Result<Option<Record>> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::serialization(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn write(&self, path: &Path, record: &Record) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let bytes =
            serde_json::to_vec_pretty(record).map_err(|e| StoreError::serialization(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Record>> {
        let path = self.path_for(kind, key)?;
        self.read(&path).await
    }

    async fn create(&self, mut record: Record) -> Result<Record> {
        let key = record.key();
        let path = self.path_for(record.kind, &key)?;

        let _guard = self.write_lock.lock().await;
        if self.read(&path).await?.is_some() {
            return Err(StoreError::AlreadyExists {
                kind: record.kind,
                key,
            });
        }

        record.meta.resource_version = 1;
        self.write(&path, &record).await?;
        Ok(record)
    }

    async fn update(&self, mut record: Record) -> Result<Record> {
        let key = record.key();
        let path = self.path_for(record.kind, &key)?;

        let _guard = self.write_lock.lock().await;
        let Some(current) = self.read(&path).await? else {
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
        self.write(&path, &record).await?;
        Ok(record)
    }
}
