//! Blob store implementations: local filesystem for deployments, in-memory
//! for tests and ephemeral runs.

use crate::backend::{BlobMeta, BlobStore, StorageError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Filesystem-backed [`BlobStore`] rooted at one directory.
///
/// Keys map to paths under the root. Separators inside keys create
/// subdirectories; `..` segments are rejected so a key can never escape the
/// root.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsBlobStore { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::Io("empty blob key".to_string()));
        }
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                std::path::Component::ParentDir
                    | std::path::Component::RootDir
                    | std::path::Component::Prefix(_)
            )
        });
        if escapes {
            return Err(StorageError::Io(format!(
                "blob key {key:?} escapes the store root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(key, size = bytes.len(), "blob stored");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, StorageError> {
        let mut metas = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let key = match path.strip_prefix(&self.root) {
                    Ok(rel) => rel.to_string_lossy().into_owned(),
                    Err(_) => continue,
                };
                if key.starts_with(prefix) {
                    let size_bytes = entry.metadata().await?.len();
                    metas.push(BlobMeta { key, size_bytes });
                }
            }
        }
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }
}

/// In-memory [`BlobStore`] for tests and single-process ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.write().await.remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, StorageError> {
        Ok(self
            .blobs
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, bytes)| BlobMeta {
                key: key.clone(),
                size_bytes: bytes.len() as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        store.put("jobs/a.bin", b"hello").await.unwrap();
        assert_eq!(store.get("jobs/a.bin").await.unwrap().unwrap(), b"hello");
        assert!(store.get("jobs/missing.bin").await.unwrap().is_none());
        assert!(store.delete("jobs/a.bin").await.unwrap());
        assert!(!store.delete("jobs/a.bin").await.unwrap());
    }

    #[tokio::test]
    async fn memory_store_list_by_prefix() {
        let store = MemoryBlobStore::new();
        store.put("jobs/a.bin", b"1").await.unwrap();
        store.put("jobs/b.bin", b"22").await.unwrap();
        store.put("other/c.bin", b"333").await.unwrap();
        let metas = store.list("jobs/").await.unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].key, "jobs/a.bin");
        assert_eq!(metas[1].size_bytes, 2);
    }

    #[tokio::test]
    async fn fs_store_round_trip_and_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let path = store.put("uploads/doc/page.png", b"png-bytes").await.unwrap();
        assert!(path.ends_with("page.png"));
        assert_eq!(
            store.get("uploads/doc/page.png").await.unwrap().unwrap(),
            b"png-bytes"
        );
        assert!(store.get("uploads/absent").await.unwrap().is_none());
        assert!(store.delete("uploads/doc/page.png").await.unwrap());
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.put("../outside.bin", b"x").await.is_err());
        assert!(store.get("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn fs_store_list_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("a/one.bin", b"1").await.unwrap();
        store.put("a/b/two.bin", b"22").await.unwrap();
        store.put("z.bin", b"333").await.unwrap();
        let metas = store.list("a").await.unwrap();
        assert_eq!(metas.len(), 2);
        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
