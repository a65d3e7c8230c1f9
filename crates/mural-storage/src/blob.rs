//! Blob Store
//!
//! Object storage abstraction for materialized image assets, with an
//! in-memory implementation for tests and development and a filesystem
//! implementation for deployments.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

/// Blob store error type
#[derive(Debug, Error)]
pub enum BlobError {
    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Object not found
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Backend-specific failure
    #[error("blob backend error: {0}")]
    Backend(String),
}

/// Object storage for image assets.
///
/// Paths are slash-separated keys (`projects/{project}/{element}.png`);
/// uploads overwrite existing objects at the same path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes at a path, returning the path.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError>;

    /// Public URL for a stored path.
    fn public_url(&self, path: &str) -> String;

    /// Delete objects. Missing paths are not an error.
    async fn delete(&self, paths: &[String]) -> Result<(), BlobError>;

    /// List stored paths under a prefix.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

/// In-memory blob store backed by a map.
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
    public_base: String,
}

impl MemoryBlobStore {
    /// Create an empty store with a public URL base.
    #[must_use]
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            public_base: public_base.into(),
        }
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }

    /// Fetch stored bytes, for assertions in tests.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap()
            .get(path)
            .map(|(bytes, _)| bytes.clone())
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("/blobs")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        self.objects
            .write()
            .unwrap()
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path)
    }

    async fn delete(&self, paths: &[String]) -> Result<(), BlobError> {
        let mut objects = self.objects.write().unwrap();
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        Ok(self
            .objects
            .read()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Filesystem blob store rooted at a directory.
pub struct FsBlobStore {
    root: PathBuf,
    public_base: String,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, serving URLs under `public_base`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        // Keys are internally generated, but reject traversal anyway.
        if path.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(BlobError::Backend(format!("invalid blob path: {path}")));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, BlobError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path)
    }

    async fn delete(&self, paths: &[String]) -> Result<(), BlobError> {
        for path in paths {
            let full = self.resolve(path)?;
            match tokio::fs::remove_file(&full).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let dir = self.resolve(prefix.trim_end_matches('/'))?;
        let mut paths = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                paths.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
            }
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryBlobStore::default();
        let path = store
            .upload("projects/p1/a.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();

        assert_eq!(path, "projects/p1/a.png");
        assert_eq!(store.get(&path), Some(vec![1, 2, 3]));
        assert_eq!(store.public_url(&path), "/blobs/projects/p1/a.png");
    }

    #[tokio::test]
    async fn test_memory_store_delete_and_list() {
        let store = MemoryBlobStore::default();
        store
            .upload("projects/p1/a.png", vec![1], "image/png")
            .await
            .unwrap();
        store
            .upload("projects/p1/b.png", vec![2], "image/png")
            .await
            .unwrap();
        store
            .upload("projects/p2/c.png", vec![3], "image/png")
            .await
            .unwrap();

        let mut listed = store.list_prefix("projects/p1/").await.unwrap();
        listed.sort();
        assert_eq!(listed, vec!["projects/p1/a.png", "projects/p1/b.png"]);

        store
            .delete(&["projects/p1/a.png".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost:8080/blobs");

        store
            .upload("projects/p1/a.png", vec![9, 9], "image/png")
            .await
            .unwrap();

        let listed = store.list_prefix("projects/p1/").await.unwrap();
        assert_eq!(listed, vec!["projects/p1/a.png"]);
        assert_eq!(
            store.public_url("projects/p1/a.png"),
            "http://localhost:8080/blobs/projects/p1/a.png"
        );

        store
            .delete(&["projects/p1/a.png".to_string()])
            .await
            .unwrap();
        assert!(store.list_prefix("projects/p1/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "/blobs");
        let result = store.upload("../escape.png", vec![1], "image/png").await;
        assert!(result.is_err());
    }
}
