/// Object storage
///
/// The pipeline only needs four operations from a bucket-like store:
/// get, put, copy and a batch delete. [`LocalStore`] implements them
/// over a directory tree so a batch can run without any cloud service.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::StorageError;

/// Bucket-like key/value store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Delete several keys at once. Missing keys are not an error.
    async fn delete(&self, keys: &[String]) -> Result<(), StorageError>;
}

/// Move an object: copy to the new key, then delete the old one
pub async fn relocate(store: &dyn ObjectStore, from: &str, to: &str) -> Result<(), StorageError> {
    store.copy(from, to).await?;
    store.delete(&[from.to_string()]).await
}

/// Store rooted at a local directory; keys are relative paths
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key, refusing anything that would escape the root
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let escapes = key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == ".." || segment.is_empty());
        if escapes {
            return Err(StorageError::Backend {
                operation: "resolve",
                key: key.to_string(),
                message: "invalid object key".to_string(),
            });
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }
        Ok(())
    }
}

fn not_found_or_io(key: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound {
            key: key.to_string(),
        }
    } else {
        StorageError::io(key, e)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| not_found_or_io(key, e))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        self.ensure_parent(key, &path).await?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        debug!(key, "Stored object");
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let source = self.path_for(from)?;
        let target = self.path_for(to)?;
        self.ensure_parent(to, &target).await?;
        fs::copy(&source, &target)
            .await
            .map_err(|e| not_found_or_io(from, e))?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            let path = self.path_for(key)?;
            match fs::remove_file(&path).await {
                Ok(()) => debug!(key = %key, "Deleted object"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(key.as_str(), e)),
            }
        }
        Ok(())
    }
}
