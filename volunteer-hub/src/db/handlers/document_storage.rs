//! Storage backends for uploaded document contents.
//!
//! Metadata lives in the `documents` table (see [`super::documents`]); the bytes go through a
//! [`DocumentStore`] addressed by an opaque storage key.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::db::errors::{DbError, Result};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store content and return its storage key
    async fn put(&self, content: &[u8]) -> Result<String>;

    /// Read content back by storage key
    async fn get(&self, storage_key: &str) -> Result<Vec<u8>>;

    /// Remove content. Missing keys are not an error.
    async fn delete(&self, storage_key: &str) -> Result<()>;
}

fn io_error(context: &str, e: std::io::Error) -> DbError {
    DbError::Other(anyhow::anyhow!("{context}: {e}"))
}

/// Writes each document to its own file under a base directory, sharded by the first two
/// characters of a random id.
pub struct LocalDocumentStore {
    base_path: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    /// Resolve a storage key, refusing anything that would escape the base directory.
    fn resolve(&self, storage_key: &str) -> Result<PathBuf> {
        let relative = Path::new(storage_key);
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(DbError::NotFound);
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn put(&self, content: &[u8]) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let storage_key = format!("{}/{}.bin", &id[..2], id);
        let full_path = self.base_path.join(&storage_key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error("create document directory", e))?;
        }

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| io_error("create document file", e))?;
        file.write_all(content).await.map_err(|e| io_error("write document", e))?;
        file.sync_all().await.map_err(|e| io_error("sync document", e))?;

        Ok(storage_key)
    }

    async fn get(&self, storage_key: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(storage_key)?;
        match fs::read(&full_path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DbError::NotFound),
            Err(e) => Err(io_error("read document", e)),
        }
    }

    async fn delete(&self, storage_key: &str) -> Result<()> {
        let full_path = self.resolve(storage_key)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete document", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());

        let key = store.put(b"volunteer agreement").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"volunteer agreement");

        store.delete(&key).await.unwrap();
        assert!(matches!(store.get(&key).await, Err(DbError::NotFound)));
        // deleting twice is fine
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());
        assert!(matches!(store.get("../etc/passwd").await, Err(DbError::NotFound)));
        assert!(matches!(store.get("/etc/passwd").await, Err(DbError::NotFound)));
    }
}
